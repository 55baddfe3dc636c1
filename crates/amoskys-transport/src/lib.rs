//! mTLS-framed transport between agents and the bus.
//!
//! Identity is asserted at the envelope layer (`source_identity`) and
//! checked against the [`trust::TrustMap`]; the TLS layer's job is
//! confidentiality and tamper-evidence on the wire, not identity
//! extraction. See the crate's design notes for why certificate-CN
//! cross-checking was left for later (§9 open question).

pub mod channel;
pub mod client;
pub mod listener;
pub mod tls;
pub mod trust;

pub use channel::{FramedChannel, SharedChannel};
pub use listener::{BusListener, HotReloadingServerConfig};
pub use trust::TrustMap;

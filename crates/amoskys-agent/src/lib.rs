//! The endpoint agent (§4.2, §4.5, §6.5, §6.6): collectors that compose
//! the detection primitives library, a durable local queue bridging bus
//! outages, and the shipper that drains that queue against the bus's
//! ACK-driven retry contract.

pub mod baseline;
pub mod collectors;
pub mod config;
pub mod shipper;
pub mod shutdown;
pub mod sink;

pub use config::AgentConfig;
pub use shipper::{Shipper, ShipperConfig, ShipperHalt};
pub use shutdown::ShutdownFlag;
pub use sink::EnvelopeSink;

//! The agent's collectors (§4.5 composition): each wraps the detection
//! primitives library around a single host-state source and hands its
//! findings to an [`crate::sink::EnvelopeSink`]. A collector never talks
//! to the bus or the durable queue directly.

pub mod dns;
pub mod fim;
pub mod kernel_audit;
pub mod peripheral;
pub mod process;

pub use dns::{DnsCollector, DnsQuery, DnsQuerySource, NullDnsQuerySource};
pub use fim::FimCollector;
pub use kernel_audit::KernelAuditCollector;
pub use peripheral::PeripheralCollector;
pub use process::ProcessCollector;

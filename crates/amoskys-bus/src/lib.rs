//! The EventBus ingest server: the admission pipeline an inbound
//! envelope travels through (§4.1), the transport wiring that feeds it,
//! and the observability surface an operator probes it with (§6.7).

pub mod ack;
pub mod admission;
pub mod liveness;
pub mod metrics;
pub mod server;

pub use ack::{Ack, PublishAck};
pub use admission::{AdmissionPipeline, TelemetryFanOut};
pub use liveness::LivenessState;
pub use metrics::BusMetrics;
pub use server::BusServer;

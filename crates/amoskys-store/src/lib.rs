//! Durable storage for the bus: write-ahead log, telemetry archive, and
//! incident lifecycle (§3.7, §4.6, §6.3).

mod checksum;
mod incident_store;
mod schema;
mod store;
mod telemetry_store;
mod wal;

pub use incident_store::{Incident, IncidentState, IncidentStore};
pub use store::Store;
pub use telemetry_store::{StoredTelemetryEvent, TelemetryStore};
pub use wal::{AppendOutcome, Wal, WalEntry};

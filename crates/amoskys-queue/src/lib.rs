//! Local durable queue bridging agent-side outages (§4.2).

mod queue;
mod schema;

pub use queue::{DurableQueue, NackOutcome, QueuedEntry};

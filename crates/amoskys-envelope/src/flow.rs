//! Network flow events (§3.3).

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Inbound,
    Outbound,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FlowEvent {
    pub src_addr: String,
    pub src_port: u16,
    pub dst_addr: String,
    pub dst_port: u16,
    pub protocol: String,
    pub direction: Direction,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub packet_count: u64,
    pub start_ts_ns: u64,
    pub end_ts_ns: u64,
}

impl FlowEvent {
    pub fn duration_ns(&self) -> u64 {
        self.end_ts_ns.saturating_sub(self.start_ts_ns)
    }

    pub fn total_bytes(&self) -> u64 {
        self.bytes_in.saturating_add(self.bytes_out)
    }
}

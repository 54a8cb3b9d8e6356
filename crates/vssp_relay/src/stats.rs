use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use vssp_core::TableStats;

/// Counters for the relay as a whole, served at `/api/stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RelayStats {
    pub datagrams: u64,
    /// Datagrams without the VSSP marker.
    pub foreign: u64,
    /// VSSP datagrams with a truncated header or overrunning payload.
    pub malformed: u64,
    pub frames_broadcast: u64,
    pub envelopes_delivered: u64,
    /// Envelopes dropped from a lagging viewer's queue.
    pub envelopes_dropped: u64,
    pub viewers_connected: usize,
    pub viewers_dropped: u64,
    pub buffers_in_flight: usize,
    pub assembly: TableStats,
}

pub type SharedStats = Arc<RwLock<RelayStats>>;

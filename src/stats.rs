use bevy::prelude::Resource;

/// Diagnostic counters surfaced to overlays and the host, refreshed after
/// every maintenance tick.
#[derive(Resource, Clone, Default, serde::Serialize)]
pub struct NavStats {
    pub link_count: usize,
    pub node_count: usize,
    pub surface_entries: usize,
    pub rebuild_count: u64,
    pub refresh_count: u64,
    /// Links dropped by the last tick's diff.
    pub last_removed: usize,
    /// Ground segments rebuilt or re-linked by the last tick.
    pub last_refreshed: usize,
    /// Jump/fall connectors produced by the last tick.
    pub last_connectors: usize,
    pub graph_lock_timeouts: u64,
    pub surface_lock_timeouts: u64,
    pub last_maintenance_ms: f32,
    pub trace_len: usize,
}

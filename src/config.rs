///
/// Construction-time configuration for a [`crate::state_machine::StateMachine`].
///
/// Mirrors the handful of knobs the Raft collaborator contract exposes:
/// whether snapshot capture blocks the calling thread or is handed off to a
/// worker pool, and how many snapshot contexts to retain.
///
#[derive(Debug, Clone)]
pub struct StateMachineConfig {
    /// When `false` (the default), `create_snapshot` copies the KV store and
    /// invokes the completion callback on the caller's thread. When `true`,
    /// the copy happens on a pooled worker thread and the callback fires
    /// from there instead.
    pub async_snapshot_creation: bool,

    /// Number of snapshot contexts retained before the oldest is evicted.
    /// Also bounds the committed-result index (see DESIGN.md for the
    /// rationale). Must be at least 1.
    pub snapshot_window: usize,

    /// Number of worker threads backing asynchronous snapshot creation.
    /// Unused when `async_snapshot_creation` is `false`.
    pub snapshot_pool_threads: u16,
}

impl Default for StateMachineConfig {
    fn default() -> Self {
        StateMachineConfig {
            async_snapshot_creation: false,
            snapshot_window: 3,
            snapshot_pool_threads: 2,
        }
    }
}

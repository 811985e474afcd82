use crate::error::Error;
use crate::snapshot::{SnapshotMeta, SnapshotRequest};

/// Callback the collaborator passes to `create_snapshot`; invoked with
/// `(success, error)` once the snapshot copy has been taken (synchronously
/// or from a pooled worker thread, depending on configuration).
pub type SnapshotDoneCallback = Box<dyn FnOnce(bool, Option<Error>) + Send>;

///
/// The contract a Raft consensus collaborator relies on when driving this
/// state machine. Raft's own internals — leader election, log replication,
/// membership changes, RPC transport — are out of scope for this crate;
/// this trait exists purely as the seam between "whatever drives the log
/// forward" and the deterministic application of committed entries, so the
/// state machine's own tests stay decoupled from any particular consensus
/// library even though only one implementation of the trait exists today.
///
pub trait ReplicatedStateMachine {
    /// Called before consensus completes for `log_index`. A no-op in this
    /// core; always returns an empty buffer.
    fn pre_commit(&self, log_index: u64, data: &[u8]) -> Vec<u8>;

    /// Called once `log_index` has been committed by quorum. Decodes and
    /// applies `data`, returning the `(log_index, has_mr_results)` result
    /// buffer described in the commit pipeline documentation.
    fn commit(&self, log_index: u64, data: &[u8]) -> Vec<u8>;

    /// Called on commit of a membership change. Updates the last-committed
    /// index only; no data mutation.
    fn commit_config(&self, log_index: u64);

    /// Called to roll back a log entry that was pre-committed but never
    /// committed. A no-op in this core.
    fn rollback(&self, log_index: u64, data: &[u8]);

    /// Leader-driven compaction: capture the current KV store as a new
    /// snapshot context keyed by `request.last_log_index`, then invoke
    /// `when_done`. Runs synchronously or asynchronously depending on
    /// configuration.
    fn create_snapshot(&self, request: SnapshotRequest, when_done: SnapshotDoneCallback);

    /// Read object `obj_id` of the snapshot at `request.last_log_index` for
    /// transport to a follower. Returns `(bytes, is_last_obj)`.
    fn read_snapshot_object(&self, request: &SnapshotRequest, obj_id: u64) -> (Vec<u8>, bool);

    /// Install object `obj_id` of an incoming snapshot, creating the
    /// snapshot context at `request.last_log_index` if it does not exist.
    fn save_snapshot_object(
        &self,
        request: &SnapshotRequest,
        obj_id: u64,
        bytes: &[u8],
        is_first: bool,
        is_last: bool,
    );

    /// Replace the live KV store with the one captured in the snapshot
    /// context at `request.last_log_index`. Returns `false` if no such
    /// context exists.
    fn apply_snapshot(&self, request: &SnapshotRequest) -> bool;

    /// Metadata of the most recently retained snapshot, if any.
    fn last_snapshot(&self) -> Option<SnapshotMeta>;

    /// The last committed log index.
    fn last_commit_index(&self) -> u64;

    /// Release resources associated with a user snapshot context obtained
    /// from `read_snapshot_object`. A no-op: this core never allocates a
    /// per-read context.
    fn free_user_snapshot_context(&self);
}

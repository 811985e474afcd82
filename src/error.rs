use thiserror::Error;

/// Convenience alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the KV store, the map-reduce engine, and the state
/// machine's commit/snapshot hooks.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Lookup of a key that does not exist in the store.
    #[error("key not found: `{0}`")]
    NotFound(String),

    /// A key containing one of the snapshot format's separator characters
    /// (`:`, `,`, `;`) was passed to an insert operation.
    #[error("key `{0}` contains a reserved snapshot separator character")]
    InvalidKey(String),

    /// `map_op` is not in the fixed map catalog.
    #[error("unknown map operation: `{0}`")]
    UnknownMapOp(String),

    /// `reduce_op` is not in the fixed reduce catalog.
    #[error("unknown reduce operation: `{0}`")]
    UnknownReduceOp(String),

    /// A committed log entry could not be decoded. Treated as fatal by the
    /// commit path: a replica that cannot apply a committed entry cannot
    /// safely continue.
    #[error("corrupt log payload: {0}")]
    CorruptPayload(String),

    /// `ApplySnapshot` or `ReadSnapshotObject` referenced a snapshot context
    /// that has since been evicted from the retention window.
    #[error("snapshot for log index {0} is not retained")]
    SnapshotMissing(u64),

    /// The configured snapshot retention window was smaller than one.
    #[error("snapshot window must retain at least one snapshot, got {0}")]
    InvalidSnapshotWindow(usize),
}

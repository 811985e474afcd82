//! Replicated deterministic state machine for a multi-valued key-value
//! store with on-demand map-reduce aggregation, driven by a Raft
//! consensus log.
//!
//! The Raft protocol itself — leader election, log replication,
//! membership changes, RPC transport — is an external collaborator; this
//! crate only implements the seam it drives through [`raft`] and the
//! deterministic state behind that seam.

pub mod codec;
pub mod config;
pub mod error;
pub mod kv_store;
pub mod map_reduce;
pub mod raft;
pub mod snapshot;
pub mod state_machine;
pub mod thread_pool;

pub use codec::OperationPayload;
pub use config::StateMachineConfig;
pub use error::{Error, Result};
pub use kv_store::KvStore;
pub use map_reduce::MapReduceResult;
pub use raft::ReplicatedStateMachine;
pub use snapshot::{Membership, SnapshotContext, SnapshotMeta, SnapshotRequest};
pub use state_machine::StateMachine;

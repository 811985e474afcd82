use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use slog::{error, info, o, warn, Logger};

use crate::codec::{self, OperationPayload};
use crate::config::StateMachineConfig;
use crate::error::{Error, Result};
use crate::kv_store::KvStore;
use crate::map_reduce::{self, MapReduceResult};
use crate::raft::{ReplicatedStateMachine, SnapshotDoneCallback};
use crate::snapshot::{SnapshotContext, SnapshotMeta, SnapshotRequest, SnapshotWindow};
use crate::thread_pool::shared_queue_thread_pool::SharedQueueThreadPool;
use crate::thread_pool::ThreadPool;

/// Snapshot window and committed-result index, guarded by a single mutex
/// (`snapshots_lock`). The two live together because both are consulted
/// and mutated from the same handful of call sites (snapshot creation,
/// result lookup) and neither critical section does more than clone or
/// index a small in-memory structure.
struct SnapshotsState {
    window: SnapshotWindow,
    results: BTreeMap<u64, MapReduceResult>,
}

struct Inner {
    logger: Option<Logger>,
    config: StateMachineConfig,
    kv_store: Mutex<KvStore>,
    last_committed_index: AtomicU64,
    snapshots: Mutex<SnapshotsState>,
    // Only populated when `config.async_snapshot_creation` is set; snapshot
    // capture is handed to this pool instead of a bespoke detached thread.
    snapshot_pool: Option<SharedQueueThreadPool>,
}

///
/// Deterministic consumer of committed Raft log entries. Owns one
/// [`KvStore`], a bounded history of [`MapReduceResult`]s indexed by log
/// position, and a bounded history of snapshots. Implements
/// [`ReplicatedStateMachine`], the seam through which a Raft collaborator
/// drives it.
///
/// Cheap to clone: internally it is just an `Arc` around the shared state,
/// so a single handle can be handed out to every caller thread without
/// each one needing its own copy of the KV store or snapshot window.
///
#[derive(Clone)]
pub struct StateMachine {
    inner: Arc<Inner>,
}

impl StateMachine {
    /// Construct an empty state machine. Fails if `config.snapshot_window`
    /// is zero.
    pub fn new(config: StateMachineConfig, logger: Option<Logger>) -> Result<StateMachine> {
        if config.snapshot_window < 1 {
            return Err(Error::InvalidSnapshotWindow(config.snapshot_window));
        }

        let snapshot_pool = if config.async_snapshot_creation {
            Some(
                SharedQueueThreadPool::new(config.snapshot_pool_threads)
                    .map_err(|e| Error::CorruptPayload(e.to_string()))?,
            )
        } else {
            None
        };

        Ok(StateMachine {
            inner: Arc::new(Inner {
                logger: logger.map(|l| l.new(o!("module" => "state_machine"))),
                config,
                kv_store: Mutex::new(KvStore::new()),
                last_committed_index: AtomicU64::new(0),
                snapshots: Mutex::new(SnapshotsState {
                    window: SnapshotWindow::new(),
                    results: BTreeMap::new(),
                }),
                snapshot_pool,
            }),
        })
    }

    /// Retrieve the map-reduce result recorded for `log_index`, or the
    /// empty map if this index never produced one (not a `MapReduce` entry,
    /// already evicted from the bounded index, or the operation failed at
    /// commit time due to an unknown op name).
    pub fn get_map_reduce_results(&self, log_index: u64) -> MapReduceResult {
        self.inner
            .snapshots
            .lock()
            .unwrap()
            .results
            .get(&log_index)
            .cloned()
            .unwrap_or_default()
    }

    /// Take a point-in-time copy of the live KV store. Exposed for tests
    /// and for embedders that want to inspect state without going through
    /// the snapshot/transport machinery.
    pub fn kv_store_snapshot(&self) -> KvStore {
        self.inner.kv_store.lock().unwrap().clone()
    }

    fn bound_results_index(state: &mut SnapshotsState, window: usize) {
        while state.results.len() > window {
            let oldest = *state.results.keys().next().expect("len > window >= 0");
            state.results.remove(&oldest);
        }
    }

    fn create_snapshot_internal(&self, request: &SnapshotRequest) {
        let kv_copy = self.inner.kv_store.lock().unwrap().clone();
        let mut snapshots = self.inner.snapshots.lock().unwrap();
        snapshots.window.insert(
            SnapshotContext::new(request.last_log_index, request.last_log_term, kv_copy),
            self.inner.config.snapshot_window,
        );
        if let Some(ref logger) = self.inner.logger {
            info!(logger, "created snapshot";
                "last_log_index" => request.last_log_index,
                "last_log_term" => request.last_log_term,
                "retained" => snapshots.window.len());
        }
    }
}

impl ReplicatedStateMachine for StateMachine {
    fn pre_commit(&self, _log_index: u64, _data: &[u8]) -> Vec<u8> {
        Vec::new()
    }

    fn commit(&self, log_index: u64, data: &[u8]) -> Vec<u8> {
        let payload = match codec::decode(data) {
            Ok(payload) => payload,
            Err(err) => {
                if let Some(ref logger) = self.inner.logger {
                    error!(logger, "corrupt committed payload, aborting";
                        "log_index" => log_index, "error" => err.to_string());
                }
                // The log is authoritative: a replica that cannot apply a
                // committed entry cannot safely continue.
                panic!("corrupt payload at log index {}: {}", log_index, err);
            }
        };

        let mut has_map_reduce_results = false;

        match payload {
            OperationPayload::InsertValue { key, value } => {
                let mut kv = self.inner.kv_store.lock().unwrap();
                if let Err(err) = kv.insert(&key, value) {
                    if let Some(ref logger) = self.inner.logger {
                        warn!(logger, "insert rejected, commit absorbed the error";
                            "log_index" => log_index, "error" => err.to_string());
                    }
                }
            }
            OperationPayload::DeleteValue { key, value } => {
                self.inner.kv_store.lock().unwrap().remove_value(&key, value);
            }
            OperationPayload::DeleteKey { key } => {
                self.inner.kv_store.lock().unwrap().remove_key(&key);
            }
            OperationPayload::MapReduce {
                map_op,
                reduce_op,
                keys,
            } => {
                has_map_reduce_results = true;
                let result = {
                    let kv = self.inner.kv_store.lock().unwrap();
                    map_reduce::perform_map_reduce(&kv, &map_op, &reduce_op, &keys)
                };
                let mut snapshots = self.inner.snapshots.lock().unwrap();
                match result {
                    Ok(result) => {
                        snapshots.results.insert(log_index, result);
                    }
                    Err(err) => {
                        if let Some(ref logger) = self.inner.logger {
                            warn!(logger, "map-reduce failed at commit, no results recorded";
                                "log_index" => log_index, "error" => err.to_string());
                        }
                    }
                }
                let window = self.inner.config.snapshot_window;
                Self::bound_results_index(&mut snapshots, window);
            }
        }

        self.inner
            .last_committed_index
            .store(log_index, Ordering::SeqCst);

        encode_result_buffer(log_index, has_map_reduce_results)
    }

    fn commit_config(&self, log_index: u64) {
        self.inner
            .last_committed_index
            .store(log_index, Ordering::SeqCst);
    }

    fn rollback(&self, _log_index: u64, _data: &[u8]) {}

    fn create_snapshot(&self, request: SnapshotRequest, when_done: SnapshotDoneCallback) {
        if self.inner.config.async_snapshot_creation {
            let sm = self.clone();
            self.inner
                .snapshot_pool
                .as_ref()
                .expect("snapshot pool is built whenever async_snapshot_creation is set")
                .spawn(move || {
                    sm.create_snapshot_internal(&request);
                    when_done(true, None);
                });
        } else {
            self.create_snapshot_internal(&request);
            when_done(true, None);
        }
    }

    fn read_snapshot_object(&self, request: &SnapshotRequest, obj_id: u64) -> (Vec<u8>, bool) {
        if obj_id != 0 {
            // Reserved for future chunking; this core never produces
            // snapshots large enough to need it.
            return (Vec::new(), true);
        }
        let snapshots = self.inner.snapshots.lock().unwrap();
        match snapshots.window.get(request.last_log_index) {
            Some(ctx) => (
                crate::snapshot::serialize_kv_store(&ctx.kv_store).into_bytes(),
                true,
            ),
            None => (Vec::new(), true),
        }
    }

    fn save_snapshot_object(
        &self,
        request: &SnapshotRequest,
        obj_id: u64,
        bytes: &[u8],
        _is_first: bool,
        _is_last: bool,
    ) {
        if obj_id != 0 {
            return;
        }
        let kv_store = crate::snapshot::deserialize_kv_store(&String::from_utf8_lossy(bytes));
        let mut snapshots = self.inner.snapshots.lock().unwrap();
        let last_log_term = request.last_log_term;
        let ctx = snapshots
            .window
            .entry_or_insert_with(request.last_log_index, || {
                SnapshotContext::new(request.last_log_index, last_log_term, KvStore::new())
            });
        ctx.kv_store = kv_store;
        let window = self.inner.config.snapshot_window;
        snapshots.window.evict_to(window);
    }

    fn apply_snapshot(&self, request: &SnapshotRequest) -> bool {
        let restored = {
            let snapshots = self.inner.snapshots.lock().unwrap();
            snapshots
                .window
                .get(request.last_log_index)
                .map(|ctx| ctx.kv_store.clone())
        };
        match restored {
            Some(kv) => {
                *self.inner.kv_store.lock().unwrap() = kv;
                true
            }
            None => false,
        }
    }

    fn last_snapshot(&self) -> Option<SnapshotMeta> {
        self.inner.snapshots.lock().unwrap().window.last()
    }

    fn last_commit_index(&self) -> u64 {
        self.inner.last_committed_index.load(Ordering::SeqCst)
    }

    fn free_user_snapshot_context(&self) {}
}

/// Encode the `(log_index, has_mr_results)` result buffer returned from
/// `commit`. Host-native endianness — not portable across mixed-architecture
/// clusters, a known latent defect that is preserved deliberately rather
/// than papered over (see DESIGN.md).
fn encode_result_buffer(log_index: u64, has_map_reduce_results: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(9);
    buf.extend_from_slice(&log_index.to_ne_bytes());
    buf.push(has_map_reduce_results as u8);
    buf
}

/// Decode a result buffer produced by `commit`. Exposed for the
/// client-facing side of the contract: after a successful append, a
/// caller decodes this buffer to learn whether it should follow up with
/// `get_map_reduce_results`.
pub fn decode_result_buffer(buf: &[u8]) -> Option<(u64, bool)> {
    if buf.len() != 9 {
        return None;
    }
    let mut index_bytes = [0u8; 8];
    index_bytes.copy_from_slice(&buf[..8]);
    Some((u64::from_ne_bytes(index_bytes), buf[8] != 0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::Membership;

    fn sm() -> StateMachine {
        StateMachine::new(StateMachineConfig::default(), None).unwrap()
    }

    fn commit_payload(sm: &StateMachine, log_index: u64, payload: OperationPayload) -> Vec<u8> {
        let bytes = codec::encode(&payload).unwrap();
        sm.commit(log_index, &bytes)
    }

    fn request(last_log_index: u64) -> SnapshotRequest {
        SnapshotRequest {
            last_log_index,
            last_log_term: 1,
            membership: Membership::default(),
        }
    }

    #[test]
    fn commit_insert_then_get_values() {
        let sm = sm();
        commit_payload(
            &sm,
            1,
            OperationPayload::InsertValue {
                key: "Books".to_string(),
                value: 100,
            },
        );
        commit_payload(
            &sm,
            2,
            OperationPayload::InsertValue {
                key: "Books".to_string(),
                value: 200,
            },
        );
        assert_eq!(
            sm.kv_store_snapshot().get_values("Books").unwrap(),
            vec![100, 200]
        );
        assert_eq!(sm.last_commit_index(), 2);
    }

    #[test]
    fn commit_result_buffer_flags_map_reduce_entries() {
        let sm = sm();
        let result_buf = commit_payload(
            &sm,
            1,
            OperationPayload::InsertValue {
                key: "A".to_string(),
                value: 1,
            },
        );
        assert_eq!(decode_result_buffer(&result_buf), Some((1, false)));

        let result_buf = commit_payload(
            &sm,
            2,
            OperationPayload::MapReduce {
                map_op: "double".to_string(),
                reduce_op: "sum".to_string(),
                keys: vec!["A".to_string()],
            },
        );
        assert_eq!(decode_result_buffer(&result_buf), Some((2, true)));
        assert_eq!(sm.get_map_reduce_results(2).get("A"), Some(&2));
    }

    #[test]
    fn map_reduce_commit_does_not_mutate_store() {
        let sm = sm();
        commit_payload(
            &sm,
            1,
            OperationPayload::InsertValue {
                key: "A".to_string(),
                value: 1,
            },
        );
        commit_payload(
            &sm,
            2,
            OperationPayload::MapReduce {
                map_op: "double".to_string(),
                reduce_op: "sum".to_string(),
                keys: vec!["A".to_string()],
            },
        );
        assert_eq!(sm.kv_store_snapshot().get_values("A").unwrap(), vec![1]);
    }

    #[test]
    fn unknown_map_op_records_no_result_but_commits() {
        let sm = sm();
        let result_buf = commit_payload(
            &sm,
            1,
            OperationPayload::MapReduce {
                map_op: "cube".to_string(),
                reduce_op: "sum".to_string(),
                keys: vec!["A".to_string()],
            },
        );
        assert_eq!(decode_result_buffer(&result_buf), Some((1, true)));
        assert!(sm.get_map_reduce_results(1).is_empty());
        assert_eq!(sm.last_commit_index(), 1);
    }

    #[test]
    fn commit_config_updates_index_without_mutating_store() {
        let sm = sm();
        sm.commit_config(5);
        assert_eq!(sm.last_commit_index(), 5);
        assert!(sm.kv_store_snapshot().is_empty());
    }

    #[test]
    #[should_panic(expected = "corrupt payload")]
    fn commit_panics_on_corrupt_payload() {
        let sm = sm();
        sm.commit(1, &[0xff, 0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn snapshot_round_trips_through_create_and_apply() {
        let sm = sm();
        for value in 1..=5 {
            commit_payload(
                &sm,
                value as u64,
                OperationPayload::InsertValue {
                    key: "A".to_string(),
                    value,
                },
            );
        }
        let req = request(5);
        sm.create_snapshot(req.clone(), Box::new(|ok, err| {
            assert!(ok);
            assert!(err.is_none());
        }));

        commit_payload(&sm, 6, OperationPayload::DeleteKey { key: "A".to_string() });
        assert!(sm.kv_store_snapshot().get_values("A").is_err());

        assert!(sm.apply_snapshot(&req));
        assert_eq!(
            sm.kv_store_snapshot().get_values("A").unwrap(),
            vec![1, 2, 3, 4, 5]
        );
    }

    #[test]
    fn snapshot_window_retains_at_most_three_by_default() {
        let sm = sm();
        for log_index in 1..=5u64 {
            sm.create_snapshot(request(log_index), Box::new(|_, _| {}));
        }
        assert_eq!(sm.last_snapshot().unwrap().last_log_index, 5);
        assert!(!sm.apply_snapshot(&request(1)));
        assert!(!sm.apply_snapshot(&request(2)));
        assert!(sm.apply_snapshot(&request(5)));
    }

    #[test]
    fn read_snapshot_object_returns_empty_and_last_for_evicted_snapshot() {
        let sm = sm();
        let (bytes, is_last) = sm.read_snapshot_object(&request(42), 0);
        assert!(bytes.is_empty());
        assert!(is_last);
    }

    #[test]
    fn read_then_save_snapshot_object_transports_store() {
        let source = sm();
        commit_payload(
            &source,
            1,
            OperationPayload::InsertValue {
                key: "A".to_string(),
                value: 7,
            },
        );
        let req = request(1);
        source.create_snapshot(req.clone(), Box::new(|_, _| {}));
        let (bytes, is_last) = source.read_snapshot_object(&req, 0);
        assert!(is_last);

        let follower = sm();
        follower.save_snapshot_object(&req, 0, &bytes, true, true);
        assert!(follower.apply_snapshot(&req));
        assert_eq!(
            follower.kv_store_snapshot().get_values("A").unwrap(),
            vec![7]
        );
    }

    #[test]
    fn async_snapshot_creation_runs_off_the_caller_thread() {
        let mut config = StateMachineConfig::default();
        config.async_snapshot_creation = true;
        let sm = StateMachine::new(config, None).unwrap();

        commit_payload(
            &sm,
            1,
            OperationPayload::InsertValue {
                key: "A".to_string(),
                value: 9,
            },
        );

        let (tx, rx) = std::sync::mpsc::channel();
        sm.create_snapshot(
            request(1),
            Box::new(move |ok, _err| {
                tx.send(ok).unwrap();
            }),
        );
        assert!(rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap());
        assert!(sm.apply_snapshot(&request(1)));
    }

    #[test]
    fn invalid_snapshot_window_is_rejected_at_construction() {
        let mut config = StateMachineConfig::default();
        config.snapshot_window = 0;
        assert!(matches!(
            StateMachine::new(config, None),
            Err(Error::InvalidSnapshotWindow(0))
        ));
    }
}

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

///
/// The operation a single committed log entry carries. This is the only
/// payload shape the state machine's commit path understands; everything
/// the Raft collaborator replicates for this application is one of these
/// four variants.
///
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub enum OperationPayload {
    /// Append `value` to `key`'s sequence, creating the key if absent.
    InsertValue { key: String, value: i32 },
    /// Remove the first occurrence of `value` from `key`'s sequence.
    DeleteValue { key: String, value: i32 },
    /// Remove the entire key.
    DeleteKey { key: String },
    /// Read-only aggregation request; does not mutate the store.
    MapReduce {
        map_op: String,
        reduce_op: String,
        keys: Vec<String>,
    },
}

///
/// Encode a payload to an opaque, host-local byte buffer.
///
/// The wire shape is a variant tag followed by the variant's fields, with
/// strings and the key list length-prefixed — this is exactly what `bincode`
/// produces from the `#[derive(Serialize)]` above, so there is no need to
/// hand-roll the framing. The encoding is not intended to be portable across
/// architectures (cross-node portability is explicitly out of scope); it
/// only needs to round-trip on a single
/// host, which `bincode`'s fixed little-endian-on-the-wire-but-native-size
/// integer encoding satisfies.
///
pub fn encode(payload: &OperationPayload) -> Result<Vec<u8>> {
    bincode::serialize(payload).map_err(|e| Error::CorruptPayload(e.to_string()))
}

///
/// Decode a payload previously produced by [`encode`]. Any failure —
/// truncated buffer, bad tag, invalid UTF-8 in a string field — is reported
/// as `Error::CorruptPayload`, which the commit path (`state_machine.rs`)
/// treats as fatal: a replica that cannot decode a committed entry cannot
/// safely continue applying the log.
///
pub fn decode(bytes: &[u8]) -> Result<OperationPayload> {
    bincode::deserialize(bytes).map_err(|e| Error::CorruptPayload(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(payload: OperationPayload) {
        let bytes = encode(&payload).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn round_trips_insert_value() {
        round_trip(OperationPayload::InsertValue {
            key: "Books".to_string(),
            value: 100,
        });
    }

    #[test]
    fn round_trips_delete_value() {
        round_trip(OperationPayload::DeleteValue {
            key: "Books".to_string(),
            value: 100,
        });
    }

    #[test]
    fn round_trips_delete_key() {
        round_trip(OperationPayload::DeleteKey {
            key: "Books".to_string(),
        });
    }

    #[test]
    fn round_trips_map_reduce_with_many_keys() {
        round_trip(OperationPayload::MapReduce {
            map_op: "double".to_string(),
            reduce_op: "sum".to_string(),
            keys: vec!["Cat1".to_string(), "Cat2".to_string()],
        });
    }

    #[test]
    fn round_trips_map_reduce_with_no_keys() {
        round_trip(OperationPayload::MapReduce {
            map_op: "square".to_string(),
            reduce_op: "product".to_string(),
            keys: vec![],
        });
    }

    #[test]
    fn boundary_integers_round_trip() {
        round_trip(OperationPayload::InsertValue {
            key: "A".to_string(),
            value: i32::MIN,
        });
        round_trip(OperationPayload::InsertValue {
            key: "A".to_string(),
            value: i32::MAX,
        });
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = decode(&[0xff, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, Error::CorruptPayload(_)));
    }

    #[test]
    fn decode_rejects_truncated_buffer() {
        let bytes = encode(&OperationPayload::DeleteKey {
            key: "Books".to_string(),
        })
        .unwrap();
        let err = decode(&bytes[..bytes.len() - 1]).unwrap_err();
        assert!(matches!(err, Error::CorruptPayload(_)));
    }
}

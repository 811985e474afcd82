use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Characters that terminate or separate fields in the logical snapshot
/// format (`snapshot.rs`). A key containing one of these would make a
/// serialized snapshot ambiguous to parse back, so they are rejected here at
/// insert time rather than handled by a peer-coordinated escaping scheme.
const RESERVED_KEY_CHARS: [char; 3] = [':', ',', ';'];

fn check_key(key: &str) -> Result<()> {
    if key.is_empty() || key.contains(RESERVED_KEY_CHARS.as_slice()) {
        return Err(Error::InvalidKey(key.to_string()));
    }
    Ok(())
}

///
/// In-memory mapping from a string key to an ordered, duplicate-permitting
/// sequence of signed 32-bit values.
///
/// Keys are held in a `BTreeMap` rather than a `HashMap` so that `get_all`
/// visits them in ascending lexicographic order without an extra sort step —
/// this is what makes the commit pipeline and the snapshot format
/// deterministic across replicas.
///
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KvStore {
    store: BTreeMap<String, Vec<i32>>,
}

impl KvStore {
    /// Create a new, empty store.
    pub fn new() -> KvStore {
        KvStore {
            store: BTreeMap::new(),
        }
    }

    /// Append `value` to `key`'s sequence, creating the key if absent.
    pub fn insert(&mut self, key: &str, value: i32) -> Result<()> {
        check_key(key)?;
        self.store.entry(key.to_string()).or_default().push(value);
        Ok(())
    }

    /// Append all of `values`, in order, to `key`'s sequence. An empty
    /// `values` slice is a no-op: it must not leave an empty-sequence entry
    /// observable for `key`.
    pub fn insert_many(&mut self, key: &str, values: &[i32]) -> Result<()> {
        check_key(key)?;
        if values.is_empty() {
            return Ok(());
        }
        self.store
            .entry(key.to_string())
            .or_default()
            .extend_from_slice(values);
        Ok(())
    }

    /// Remove the first occurrence of `value` from `key`'s sequence.
    /// Returns whether a removal happened; an absent key returns `false`.
    pub fn remove_value(&mut self, key: &str, value: i32) -> bool {
        let Some(values) = self.store.get_mut(key) else {
            return false;
        };
        let Some(pos) = values.iter().position(|v| *v == value) else {
            return false;
        };
        values.remove(pos);
        if values.is_empty() {
            self.store.remove(key);
        }
        true
    }

    /// For each `v` in `values`, remove the first occurrence of `v` from
    /// `key`'s sequence (one removal per input element, even on duplicate
    /// inputs). Returns `true` iff the key existed; individual misses within
    /// `values` are silent.
    pub fn remove_many(&mut self, key: &str, values: &[i32]) -> bool {
        if !self.store.contains_key(key) {
            return false;
        }
        for value in values {
            // Re-borrow per iteration: `or_default` above guarantees the
            // key is still present unless a prior removal emptied it.
            let Some(existing) = self.store.get_mut(key) else {
                break;
            };
            if let Some(pos) = existing.iter().position(|v| v == value) {
                existing.remove(pos);
                if existing.is_empty() {
                    self.store.remove(key);
                }
            }
        }
        true
    }

    /// Remove the entire key. Returns whether a key was removed.
    pub fn remove_key(&mut self, key: &str) -> bool {
        self.store.remove(key).is_some()
    }

    /// Return a copy of `key`'s sequence, or `Error::NotFound` if absent.
    pub fn get_values(&self, key: &str) -> Result<Vec<i32>> {
        self.store
            .get(key)
            .cloned()
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }

    /// Iterate over all entries in ascending lexicographic key order.
    pub fn get_all(&self) -> impl Iterator<Item = (&str, &[i32])> {
        self.store.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of distinct keys currently stored.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

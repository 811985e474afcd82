use std::collections::BTreeMap;

use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::kv_store::KvStore;

/// The fixed, closed catalog of unary map operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MapOp {
    Square,
    Double,
    Triple,
}

impl MapOp {
    fn parse(name: &str) -> Result<MapOp> {
        match name {
            "square" => Ok(MapOp::Square),
            "double" => Ok(MapOp::Double),
            "triple" => Ok(MapOp::Triple),
            other => Err(Error::UnknownMapOp(other.to_string())),
        }
    }

    /// Apply the map function. Arithmetic wraps silently on overflow, as
    /// required for all 32-bit arithmetic in this engine.
    fn apply(self, x: i32) -> i32 {
        match self {
            MapOp::Square => x.wrapping_mul(x),
            MapOp::Double => x.wrapping_mul(2),
            MapOp::Triple => x.wrapping_mul(3),
        }
    }
}

/// The fixed, closed catalog of binary reduce operations, each with an
/// identity element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReduceOp {
    Sum,
    Product,
}

impl ReduceOp {
    fn parse(name: &str) -> Result<ReduceOp> {
        match name {
            "sum" => Ok(ReduceOp::Sum),
            "product" => Ok(ReduceOp::Product),
            other => Err(Error::UnknownReduceOp(other.to_string())),
        }
    }

    fn identity(self) -> i32 {
        match self {
            ReduceOp::Sum => 0,
            ReduceOp::Product => 1,
        }
    }

    fn apply(self, acc: i32, x: i32) -> i32 {
        match self {
            ReduceOp::Sum => acc.wrapping_add(x),
            ReduceOp::Product => acc.wrapping_mul(x),
        }
    }
}

/// Result of a map-reduce request: key to reduced scalar. Keys absent from
/// the underlying store are omitted entirely rather than mapped to the
/// reduce identity (see DESIGN.md on the two divergent source behaviors).
pub type MapReduceResult = BTreeMap<String, i32>;

/// Run `map_op` over each value of each requested key, then fold the mapped
/// values with `reduce_op` starting from its identity element.
///
/// Both operation names are validated before any key is processed — an
/// unknown `map_op` or `reduce_op` fails the whole call, not just the keys
/// that would have needed it. Keys are evaluated independently of one
/// another (and, internally, concurrently via a data-parallel iterator);
/// this is sound because the scalar produced for a given key is a pure
/// function of `(store, map_op, reduce_op, key)` and does not depend on the
/// order in which other keys are processed.
pub fn perform_map_reduce(
    store: &KvStore,
    map_op: &str,
    reduce_op: &str,
    keys: &[String],
) -> Result<MapReduceResult> {
    let map_op = MapOp::parse(map_op)?;
    let reduce_op = ReduceOp::parse(reduce_op)?;

    let per_key: Vec<(String, i32)> = keys
        .par_iter()
        .filter_map(|key| {
            let values = store.get_values(key).ok()?;
            let reduced = values
                .into_iter()
                .map(|v| map_op.apply(v))
                .fold(reduce_op.identity(), |acc, v| reduce_op.apply(acc, v));
            Some((key.clone(), reduced))
        })
        .collect();

    // `par_iter` does not preserve the original key order among duplicates,
    // but every duplicate of the same key deterministically produces the
    // same scalar, so inserting them into the result map in any order still
    // yields a deterministic final map.
    let mut result = MapReduceResult::new();
    for (key, value) in per_key {
        result.insert(key, value);
    }
    Ok(result)
}

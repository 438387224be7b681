//! Size Estimation Module
//!
//! Deterministic byte-size estimates used for the memory budget of a
//! [`BoundedCache`](crate::cache::BoundedCache).

use serde_json::Value;

// == Size Constants ==
/// Bytes charged per character of a string
pub const BYTES_PER_CHAR: usize = 2;
/// Bytes charged for any number
pub const NUMBER_SIZE: usize = 8;
/// Bytes charged for a boolean
pub const BOOL_SIZE: usize = 4;
/// Bytes charged per array item on top of the item itself
pub const ARRAY_ITEM_OVERHEAD: usize = 8;
/// Bytes charged once per object
pub const OBJECT_OVERHEAD: usize = 16;
/// Nesting depth past which nodes are charged as an empty object
pub const MAX_ESTIMATE_DEPTH: usize = 64;

// == Estimate Size ==
/// Values that can report an approximate in-memory footprint.
pub trait EstimateSize {
    /// Returns the estimated size in bytes.
    fn estimate_size(&self) -> usize;
}

impl EstimateSize for Value {
    fn estimate_size(&self) -> usize {
        estimate_value(self, 0)
    }
}

impl EstimateSize for String {
    fn estimate_size(&self) -> usize {
        str_size(self)
    }
}

impl EstimateSize for bool {
    fn estimate_size(&self) -> usize {
        BOOL_SIZE
    }
}

impl EstimateSize for i64 {
    fn estimate_size(&self) -> usize {
        NUMBER_SIZE
    }
}

impl EstimateSize for u64 {
    fn estimate_size(&self) -> usize {
        NUMBER_SIZE
    }
}

impl EstimateSize for f64 {
    fn estimate_size(&self) -> usize {
        NUMBER_SIZE
    }
}

impl<T: EstimateSize> EstimateSize for Option<T> {
    fn estimate_size(&self) -> usize {
        self.as_ref().map_or(0, EstimateSize::estimate_size)
    }
}

impl<T: EstimateSize> EstimateSize for Vec<T> {
    fn estimate_size(&self) -> usize {
        self.iter()
            .map(|item| item.estimate_size() + ARRAY_ITEM_OVERHEAD)
            .sum()
    }
}

fn str_size(s: &str) -> usize {
    s.chars().count() * BYTES_PER_CHAR
}

fn estimate_value(value: &Value, depth: usize) -> usize {
    if depth >= MAX_ESTIMATE_DEPTH {
        return OBJECT_OVERHEAD;
    }

    match value {
        Value::Null => 0,
        Value::Bool(_) => BOOL_SIZE,
        Value::Number(_) => NUMBER_SIZE,
        Value::String(s) => str_size(s),
        Value::Array(items) => items
            .iter()
            .map(|item| estimate_value(item, depth + 1) + ARRAY_ITEM_OVERHEAD)
            .sum(),
        Value::Object(fields) => {
            fields
                .iter()
                .map(|(name, field)| str_size(name) + estimate_value(field, depth + 1))
                .sum::<usize>()
                + OBJECT_OVERHEAD
        }
    }
}

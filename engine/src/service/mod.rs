//! Typed CRUD over the managed tables.
//!
//! Services assume the schema guardian has already prepared their table; they
//! add no locking of their own on top of the store's.

mod task;
mod todo;

pub use task::*;
pub use todo::*;

use serde::Serialize;

/// Count and mean of a numeric column, computed by the store.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregate {
    pub count: i64,
    /// Rounded to two decimals; `0.0` for an empty table.
    pub average: f64,
}

impl Aggregate {
    pub(crate) fn new(count: i64, raw_average: f64) -> Self {
        Self {
            count,
            average: (raw_average * 100.0).round() / 100.0,
        }
    }
}

/// Completion breakdown of the tasks table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStats {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_rounds_average() {
        assert_eq!(Aggregate::new(3, 2.0 / 3.0).average, 0.67);
        assert_eq!(Aggregate::new(0, 0.0).average, 0.0);
    }
}

//! Database module for PostgreSQL persistence.

mod pool;
mod tasks;

pub use pool::*;
pub use tasks::*;

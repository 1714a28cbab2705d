//! Request handlers for sync operations.

mod delete;
mod pull;
mod push;

pub use delete::*;
pub use pull::*;
pub use push::*;

//! Latest-wins merge of pulled records into the local store.
//!
//! Records carry no operation history, so a conflict on the same id is
//! settled by `updated_at` alone. The newer side wins; on a tie the remote
//! copy is taken, which keeps repeated pulls of an unchanged record stable.

use crate::Timestamp;
use serde::{Deserialize, Serialize};

/// What to do with one pulled record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Resolution {
    /// No local copy exists
    Insert,
    /// The local copy is strictly newer
    KeepLocal,
    /// The remote copy is as new or newer
    TakeRemote,
}

/// Decide how a remote record with `remote_updated` merges with the local copy
/// last updated at `local_updated`, if any.
pub fn resolve(local_updated: Option<Timestamp>, remote_updated: Timestamp) -> Resolution {
    match local_updated {
        None => Resolution::Insert,
        Some(local) if local > remote_updated => Resolution::KeepLocal,
        Some(_) => Resolution::TakeRemote,
    }
}

/// Counts of how a batch of pulled records was merged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub inserted: usize,
    pub updated: usize,
    pub kept_local: usize,
}

impl MergeReport {
    /// Number of records that changed the local store.
    pub fn applied(&self) -> usize {
        self.inserted + self.updated
    }
}

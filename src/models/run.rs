use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Item;

/// One row of the append-only poll log. `run_time` values are strictly
/// increasing in insertion order; removal detection depends on that.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub run_id: i64,
    pub run_time: DateTime<Utc>,
}

/// The classification produced by one reconcile call.
#[derive(Debug, Default, Clone)]
pub struct Reconciliation {
    pub new: Vec<Item>,
    pub updated: Vec<Item>,
    pub removed: Vec<Item>,
}

impl Reconciliation {
    pub fn is_quiet(&self) -> bool {
        self.new.is_empty() && self.updated.is_empty() && self.removed.is_empty()
    }
}

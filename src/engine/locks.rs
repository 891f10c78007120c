//! Per-schedule mutual exclusion
//!
//! One async mutex per master schedule, created on first use. Held across
//! the read → validate → commit sequence of a trade write.

use bson::oid::ObjectId;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::warn;

use crate::types::{LedgerError, Result};

#[derive(Default)]
pub struct ScheduleLocks {
    locks: DashMap<ObjectId, Arc<Mutex<()>>>,
}

impl ScheduleLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the schedule's lock, giving up after `wait`
    pub async fn acquire(&self, schedule_id: &ObjectId, wait: Duration) -> Result<OwnedMutexGuard<()>> {
        // Clone the Arc out so the map shard is not held across the await
        let lock = self
            .locks
            .entry(*schedule_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        tokio::time::timeout(wait, lock.lock_owned())
            .await
            .map_err(|_| {
                warn!(schedule = %schedule_id, ?wait, "timed out waiting for schedule lock");
                LedgerError::Timeout(format!("waiting for lock on schedule {}", schedule_id))
            })
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

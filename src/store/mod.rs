//! Persistence seam
//!
//! The engine talks to storage only through [`ScheduleStore`]. Writes to a
//! master schedule are conditional on the version the caller read; a
//! mismatch comes back as [`WriteOutcome::Stale`] with nothing changed, and
//! the caller decides whether to reload and retry.

mod memory;

pub use memory::MemoryScheduleStore;

use bson::oid::ObjectId;

use crate::db::schemas::{GroupDoc, UserDoc};
use crate::schedule::MasterSchedule;
use crate::trade::{ExecutionPlan, Trade, TradeStatus};
use crate::types::Result;

/// Result of a version-guarded write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Written; the stored version is now `expected + 1`
    Applied,
    /// The stored version moved on (or the targeted trade is no longer
    /// open). Nothing was written.
    Stale,
}

impl WriteOutcome {
    pub fn is_applied(self) -> bool {
        self == WriteOutcome::Applied
    }
}

/// Storage backend for master schedules and the records they reference
#[async_trait::async_trait]
pub trait ScheduleStore: Send + Sync {
    /// Persist a new master schedule and return its id
    async fn insert_schedule(&self, schedule: MasterSchedule) -> Result<ObjectId>;

    async fn find_schedule(&self, id: &ObjectId) -> Result<Option<MasterSchedule>>;

    /// Most recently created schedule of the group
    async fn find_active_schedule(&self, group_id: &ObjectId) -> Result<Option<MasterSchedule>>;

    async fn find_user(&self, id: &ObjectId) -> Result<Option<UserDoc>>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserDoc>>;

    async fn find_group(&self, id: &ObjectId) -> Result<Option<GroupDoc>>;

    /// Append an open trade to the ledger
    async fn append_trade(
        &self,
        schedule_id: &ObjectId,
        expected_version: i64,
        trade: &Trade,
    ) -> Result<WriteOutcome>;

    /// Move an open trade to a terminal status without touching ownership
    async fn set_trade_status(
        &self,
        schedule_id: &ObjectId,
        expected_version: i64,
        trade_id: &ObjectId,
        status: TradeStatus,
    ) -> Result<WriteOutcome>;

    /// Apply an execution plan atomically: void its conflicts, store the
    /// reassigned schedule and index, mark the trade executed
    async fn commit_execution(&self, plan: &ExecutionPlan) -> Result<WriteOutcome>;
}

//! In-memory store
//!
//! Same conditional-write semantics as the MongoDB store. Used by tests and
//! by tooling that does not need durability.

use bson::oid::ObjectId;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{ScheduleStore, WriteOutcome};
use crate::db::schemas::{GroupDoc, UserDoc};
use crate::schedule::MasterSchedule;
use crate::trade::{ExecutionPlan, Trade, TradeStatus};
use crate::types::{LedgerError, Result};

#[derive(Default)]
struct State {
    /// Insertion order
    schedules: Vec<MasterSchedule>,
    users: HashMap<ObjectId, UserDoc>,
    groups: HashMap<ObjectId, GroupDoc>,
}

impl State {
    fn schedule_mut(&mut self, id: &ObjectId) -> Result<&mut MasterSchedule> {
        self.schedules
            .iter_mut()
            .find(|s| s._id.as_ref() == Some(id))
            .ok_or_else(|| LedgerError::not_found(format!("master schedule {} not found", id)))
    }
}

#[derive(Default)]
pub struct MemoryScheduleStore {
    state: RwLock<State>,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a user; assigns an id when missing
    pub async fn insert_user(&self, mut user: UserDoc) -> Result<ObjectId> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email == user.email) {
            return Err(LedgerError::Conflict(format!(
                "user {} already exists",
                user.email
            )));
        }
        let id = *user._id.get_or_insert_with(ObjectId::new);
        state.users.insert(id, user);
        Ok(id)
    }

    /// Seed a group; assigns an id when missing
    pub async fn insert_group(&self, mut group: GroupDoc) -> Result<ObjectId> {
        let mut state = self.state.write().await;
        let id = *group._id.get_or_insert_with(ObjectId::new);
        state.groups.insert(id, group);
        Ok(id)
    }

    pub async fn schedule_count(&self) -> usize {
        self.state.read().await.schedules.len()
    }
}

fn is_stale(master: &MasterSchedule, expected_version: i64) -> bool {
    if master.version != expected_version {
        debug!(
            schedule = ?master._id,
            expected = expected_version,
            actual = master.version,
            "stale write rejected"
        );
        return true;
    }
    false
}

#[async_trait::async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn insert_schedule(&self, mut schedule: MasterSchedule) -> Result<ObjectId> {
        let mut state = self.state.write().await;
        let id = *schedule._id.get_or_insert_with(ObjectId::new);
        if state.schedules.iter().any(|s| s._id == Some(id)) {
            return Err(LedgerError::Conflict(format!(
                "master schedule {} already exists",
                id
            )));
        }
        schedule.metadata.touch();
        state.schedules.push(schedule);
        Ok(id)
    }

    async fn find_schedule(&self, id: &ObjectId) -> Result<Option<MasterSchedule>> {
        let state = self.state.read().await;
        Ok(state
            .schedules
            .iter()
            .find(|s| s._id.as_ref() == Some(id))
            .cloned())
    }

    async fn find_active_schedule(&self, group_id: &ObjectId) -> Result<Option<MasterSchedule>> {
        let state = self.state.read().await;
        // max_by_key keeps the last of equal keys, so ties go to the newest insert
        Ok(state
            .schedules
            .iter()
            .filter(|s| s.group_id == *group_id && !s.metadata.is_deleted)
            .max_by_key(|s| s.created_at)
            .cloned())
    }

    async fn find_user(&self, id: &ObjectId) -> Result<Option<UserDoc>> {
        Ok(self.state.read().await.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserDoc>> {
        let state = self.state.read().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_group(&self, id: &ObjectId) -> Result<Option<GroupDoc>> {
        Ok(self.state.read().await.groups.get(id).cloned())
    }

    async fn append_trade(
        &self,
        schedule_id: &ObjectId,
        expected_version: i64,
        trade: &Trade,
    ) -> Result<WriteOutcome> {
        let mut state = self.state.write().await;
        let master = state.schedule_mut(schedule_id)?;
        if is_stale(master, expected_version) {
            return Ok(WriteOutcome::Stale);
        }
        master.trade_ledger.push(trade.clone());
        master.version += 1;
        master.metadata.touch();
        Ok(WriteOutcome::Applied)
    }

    async fn set_trade_status(
        &self,
        schedule_id: &ObjectId,
        expected_version: i64,
        trade_id: &ObjectId,
        status: TradeStatus,
    ) -> Result<WriteOutcome> {
        let mut state = self.state.write().await;
        let master = state.schedule_mut(schedule_id)?;
        if is_stale(master, expected_version) {
            return Ok(WriteOutcome::Stale);
        }
        let Some(trade) = master.find_trade_mut(trade_id) else {
            return Err(LedgerError::not_found(format!("trade {} not found", trade_id)));
        };
        if !trade.is_open() {
            return Ok(WriteOutcome::Stale);
        }
        trade.status = status;
        master.version += 1;
        master.metadata.touch();
        Ok(WriteOutcome::Applied)
    }

    async fn commit_execution(&self, plan: &ExecutionPlan) -> Result<WriteOutcome> {
        let mut state = self.state.write().await;
        let master = state.schedule_mut(&plan.schedule_id)?;
        if is_stale(master, plan.expected_version) {
            return Ok(WriteOutcome::Stale);
        }
        if !master.find_trade(&plan.trade_id).is_some_and(Trade::is_open) {
            return Ok(WriteOutcome::Stale);
        }
        plan.apply_to(master)?;
        Ok(WriteOutcome::Applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::fixtures;
    use crate::trade::{fixtures::open_trade, plan_execution};
    use crate::schedule::UnitId;

    const ALICE: &str = "alice@example.com";
    const BOB: &str = "bob@example.com";

    async fn seeded() -> (MemoryScheduleStore, ObjectId, Vec<UnitId>) {
        let store = MemoryScheduleStore::new();
        let generated = fixtures::schedule(&[ALICE, BOB], 1);
        let units = generated.units().map(|(_, u)| u.id.clone()).collect();
        let master = MasterSchedule::new(generated, ObjectId::new()).unwrap();
        let id = store.insert_schedule(master).await.unwrap();
        (store, id, units)
    }

    #[tokio::test]
    async fn test_append_is_version_guarded() {
        let (store, id, u) = seeded().await;
        let trade = open_trade(ALICE, &[&u[0]], BOB, &[&u[1]]);

        assert_eq!(
            store.append_trade(&id, 0, &trade).await.unwrap(),
            WriteOutcome::Applied
        );
        assert_eq!(
            store.append_trade(&id, 0, &trade).await.unwrap(),
            WriteOutcome::Stale
        );

        let master = store.find_schedule(&id).await.unwrap().unwrap();
        assert_eq!(master.version, 1);
        assert_eq!(master.trade_ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_status_change_needs_open_trade() {
        let (store, id, u) = seeded().await;
        let trade = open_trade(ALICE, &[&u[0]], BOB, &[&u[1]]);
        store.append_trade(&id, 0, &trade).await.unwrap();

        let first = store
            .set_trade_status(&id, 1, &trade.id, TradeStatus::Cancelled)
            .await
            .unwrap();
        assert!(first.is_applied());

        let second = store
            .set_trade_status(&id, 2, &trade.id, TradeStatus::Void)
            .await
            .unwrap();
        assert_eq!(second, WriteOutcome::Stale);

        let missing = store
            .set_trade_status(&id, 2, &ObjectId::new(), TradeStatus::Void)
            .await;
        assert!(missing.is_err());
    }

    #[tokio::test]
    async fn test_commit_execution_applies_plan() {
        let (store, id, u) = seeded().await;
        let trade = open_trade(ALICE, &[&u[0]], BOB, &[&u[1]]);
        store.append_trade(&id, 0, &trade).await.unwrap();

        let master = store.find_schedule(&id).await.unwrap().unwrap();
        let plan = plan_execution(&master, &trade.id).unwrap();
        assert!(store.commit_execution(&plan).await.unwrap().is_applied());
        assert_eq!(
            store.commit_execution(&plan).await.unwrap(),
            WriteOutcome::Stale
        );

        let master = store.find_schedule(&id).await.unwrap().unwrap();
        assert_eq!(master.unit_index.owner_of(&u[0]), Some(BOB));
        assert_eq!(master.find_trade(&trade.id).unwrap().status, TradeStatus::Executed);
        master.unit_index.verify(&master.schedule).unwrap();
    }

    #[tokio::test]
    async fn test_active_schedule_is_newest() {
        let store = MemoryScheduleStore::new();
        let group = ObjectId::new();

        let older = MasterSchedule::new(fixtures::schedule(&[ALICE], 1), group).unwrap();
        let mut newer = MasterSchedule::new(fixtures::schedule(&[BOB], 1), group).unwrap();
        newer.created_at = bson::DateTime::from_millis(older.created_at.timestamp_millis() + 1000);

        let newer_id = store.insert_schedule(newer).await.unwrap();
        store.insert_schedule(older).await.unwrap();

        let active = store.find_active_schedule(&group).await.unwrap().unwrap();
        assert_eq!(active._id, Some(newer_id));
        assert!(store
            .find_active_schedule(&ObjectId::new())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_seeding_rejects_duplicate_email() {
        let store = MemoryScheduleStore::new();
        let id = store.insert_user(UserDoc::new(ALICE)).await.unwrap();
        assert!(store.insert_user(UserDoc::new(ALICE)).await.is_err());

        let found = store.find_user_by_email(ALICE).await.unwrap().unwrap();
        assert_eq!(found._id, Some(id));
    }
}

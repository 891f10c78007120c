//! Shared fixtures for the engine tests
#![allow(dead_code)]

use bson::oid::ObjectId;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use timeshare_ledger::{
    db::schemas::{GroupDoc, UserDoc},
    schedule::{Block, ScheduleUnit, Season},
    store::{MemoryScheduleStore, ScheduleStore, WriteOutcome},
    trade::{ExecutionPlan, Trade, TradeRequest, TradeStatus},
    MasterSchedule, RequestIdentity, Result, Schedule, UnitId,
};

pub const ALICE: &str = "alice@example.com";
pub const BOB: &str = "bob@example.com";
pub const CAROL: &str = "carol@example.com";
pub const DAVE: &str = "dave@example.com";

/// Account ids. Alice administers the group; Dave is not a member.
#[derive(Debug, Clone, Copy)]
pub struct Seed {
    pub group_id: ObjectId,
    pub alice: ObjectId,
    pub bob: ObjectId,
    pub carol: ObjectId,
    pub dave: ObjectId,
}

pub async fn seed_accounts(store: &MemoryScheduleStore) -> Seed {
    let group_id = ObjectId::new();
    let mut ids = Vec::new();
    for email in [ALICE, BOB, CAROL] {
        let user = UserDoc::new(email).with_groups(vec![group_id]);
        ids.push(store.insert_user(user).await.unwrap());
    }
    let dave = store.insert_user(UserDoc::new(DAVE)).await.unwrap();

    let mut group = GroupDoc::new("lake cabin", vec![ids[0]]).with_members([ids[1], ids[2]]);
    group._id = Some(group_id);
    store.insert_group(group).await.unwrap();

    Seed {
        group_id,
        alice: ids[0],
        bob: ids[1],
        carol: ids[2],
        dave,
    }
}

/// Two seasons of three weekly units: alice, bob, carol, alice, bob, carol
pub fn generated_schedule() -> Schedule {
    let base = Utc.with_ymd_and_hms(2027, 1, 2, 0, 0, 0).unwrap();
    let owners = [ALICE, BOB, CAROL];
    let seasons = (0..2)
        .map(|s| Season {
            start: None,
            blocks: vec![Block {
                start: None,
                units: (0..3)
                    .map(|u| ScheduleUnit {
                        id: UnitId::new_v4(),
                        start: base + ChronoDuration::weeks((s * 3 + u) as i64),
                        participant: owners[u].to_string(),
                    })
                    .collect(),
            }],
        })
        .collect();
    Schedule { seasons }
}

/// Unit ids in schedule order
pub fn units(master: &MasterSchedule) -> Vec<UnitId> {
    master.schedule.units().map(|(_, u)| u.id.clone()).collect()
}

pub fn as_user(id: ObjectId) -> RequestIdentity {
    RequestIdentity::new(id)
}

pub fn trade_request(
    schedule_id: ObjectId,
    initiator: &str,
    give: &[&UnitId],
    executor: &str,
    get: &[&UnitId],
) -> TradeRequest {
    TradeRequest {
        schedule_id: schedule_id.to_hex(),
        initiator_email: initiator.to_string(),
        executor_email: executor.to_string(),
        initiator_units: give.iter().map(|u| u.to_string()).collect(),
        executor_units: get.iter().map(|u| u.to_string()).collect(),
    }
}

/// Memory store with injectable latency and stale appends
#[derive(Default)]
pub struct DelayedStore {
    pub inner: MemoryScheduleStore,
    /// Added to every schedule read
    pub read_delay: Duration,
    /// Added before every execution commit
    pub commit_delay: Duration,
    /// Report every ledger append as stale without writing
    pub stale_appends: bool,
    pub append_calls: AtomicUsize,
    pub commit_calls: AtomicUsize,
}

impl DelayedStore {
    pub fn appends(&self) -> usize {
        self.append_calls.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commit_calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ScheduleStore for DelayedStore {
    async fn insert_schedule(&self, schedule: MasterSchedule) -> Result<ObjectId> {
        self.inner.insert_schedule(schedule).await
    }

    async fn find_schedule(&self, id: &ObjectId) -> Result<Option<MasterSchedule>> {
        let found = self.inner.find_schedule(id).await;
        tokio::time::sleep(self.read_delay).await;
        found
    }

    async fn find_active_schedule(&self, group_id: &ObjectId) -> Result<Option<MasterSchedule>> {
        self.inner.find_active_schedule(group_id).await
    }

    async fn find_user(&self, id: &ObjectId) -> Result<Option<UserDoc>> {
        self.inner.find_user(id).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserDoc>> {
        self.inner.find_user_by_email(email).await
    }

    async fn find_group(&self, id: &ObjectId) -> Result<Option<GroupDoc>> {
        self.inner.find_group(id).await
    }

    async fn append_trade(
        &self,
        schedule_id: &ObjectId,
        expected_version: i64,
        trade: &Trade,
    ) -> Result<WriteOutcome> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        if self.stale_appends {
            return Ok(WriteOutcome::Stale);
        }
        self.inner
            .append_trade(schedule_id, expected_version, trade)
            .await
    }

    async fn set_trade_status(
        &self,
        schedule_id: &ObjectId,
        expected_version: i64,
        trade_id: &ObjectId,
        status: TradeStatus,
    ) -> Result<WriteOutcome> {
        self.inner
            .set_trade_status(schedule_id, expected_version, trade_id, status)
            .await
    }

    async fn commit_execution(&self, plan: &ExecutionPlan) -> Result<WriteOutcome> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.commit_delay).await;
        self.inner.commit_execution(plan).await
    }
}

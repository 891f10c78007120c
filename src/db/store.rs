//! MongoDB-backed [`ScheduleStore`]
//!
//! Master schedules are single documents, so appends and status changes
//! are one conditional `update_one`. Execution needs two updates (void the
//! conflicts, then reassign and mark executed) and runs them in a session
//! transaction; any unmatched step aborts the whole thing.

use bson::{doc, oid::ObjectId, DateTime};
use mongodb::ClientSession;
use tracing::{debug, warn};

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{
    GroupDoc, UserDoc, GROUP_COLLECTION, SCHEDULE_COLLECTION, USER_COLLECTION,
};
use crate::schedule::MasterSchedule;
use crate::store::{ScheduleStore, WriteOutcome};
use crate::trade::{ExecutionPlan, Trade, TradeStatus};
use crate::types::{LedgerError, Result};

pub struct MongoScheduleStore {
    mongo: MongoClient,
    schedules: MongoCollection<MasterSchedule>,
    users: MongoCollection<UserDoc>,
    groups: MongoCollection<GroupDoc>,
}

impl MongoScheduleStore {
    /// Open the collections, creating their indexes
    pub async fn new(mongo: MongoClient) -> Result<Self> {
        Ok(Self {
            schedules: mongo.collection(SCHEDULE_COLLECTION).await?,
            users: mongo.collection(USER_COLLECTION).await?,
            groups: mongo.collection(GROUP_COLLECTION).await?,
            mongo,
        })
    }

    async fn execute_in(
        &self,
        session: &mut ClientSession,
        plan: &ExecutionPlan,
    ) -> Result<WriteOutcome> {
        if !plan.voided.is_empty() {
            let voided = self
                .schedules
                .update_one_in(
                    session,
                    doc! { "_id": plan.schedule_id, "version": plan.expected_version },
                    doc! { "$set": { "trade_ledger.$[conflict].status": TradeStatus::Void.as_str() } },
                    Some(vec![doc! {
                        "conflict._id": { "$in": plan.voided.clone() },
                        "conflict.status": TradeStatus::Open.as_str(),
                    }]),
                )
                .await?;
            if voided.matched_count == 0 {
                return Ok(WriteOutcome::Stale);
            }
        }

        let executed = self
            .schedules
            .update_one_in(
                session,
                doc! {
                    "_id": plan.schedule_id,
                    "version": plan.expected_version,
                    "trade_ledger": {
                        "$elemMatch": { "_id": plan.trade_id, "status": TradeStatus::Open.as_str() }
                    },
                },
                doc! {
                    "$set": {
                        "trade_ledger.$.status": TradeStatus::Executed.as_str(),
                        "schedule": bson::to_bson(&plan.schedule)?,
                        "unit_index": bson::to_bson(&plan.unit_index)?,
                        "metadata.updated_at": DateTime::now(),
                    },
                    "$inc": { "version": 1_i64 },
                },
                None,
            )
            .await?;
        if executed.matched_count == 0 {
            return Ok(WriteOutcome::Stale);
        }
        Ok(WriteOutcome::Applied)
    }
}

fn outcome(matched_count: u64) -> WriteOutcome {
    if matched_count == 0 {
        WriteOutcome::Stale
    } else {
        WriteOutcome::Applied
    }
}

async fn abort(session: &mut ClientSession, schedule_id: &ObjectId) {
    if let Err(e) = session.abort_transaction().await {
        warn!(schedule = %schedule_id, error = %e, "failed to abort execution transaction");
    }
}

#[async_trait::async_trait]
impl ScheduleStore for MongoScheduleStore {
    async fn insert_schedule(&self, schedule: MasterSchedule) -> Result<ObjectId> {
        self.schedules.insert_one(schedule).await
    }

    async fn find_schedule(&self, id: &ObjectId) -> Result<Option<MasterSchedule>> {
        self.schedules.find_one(doc! { "_id": *id }).await
    }

    async fn find_active_schedule(&self, group_id: &ObjectId) -> Result<Option<MasterSchedule>> {
        self.schedules
            .find_first(
                doc! { "group_id": *group_id },
                doc! { "created_at": -1, "_id": -1 },
            )
            .await
    }

    async fn find_user(&self, id: &ObjectId) -> Result<Option<UserDoc>> {
        self.users.find_one(doc! { "_id": *id }).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserDoc>> {
        self.users.find_one(doc! { "email": email }).await
    }

    async fn find_group(&self, id: &ObjectId) -> Result<Option<GroupDoc>> {
        self.groups.find_one(doc! { "_id": *id }).await
    }

    async fn append_trade(
        &self,
        schedule_id: &ObjectId,
        expected_version: i64,
        trade: &Trade,
    ) -> Result<WriteOutcome> {
        let result = self
            .schedules
            .update_one(
                doc! { "_id": *schedule_id, "version": expected_version },
                doc! {
                    "$push": { "trade_ledger": bson::to_bson(trade)? },
                    "$inc": { "version": 1_i64 },
                    "$set": { "metadata.updated_at": DateTime::now() },
                },
            )
            .await?;
        Ok(outcome(result.matched_count))
    }

    async fn set_trade_status(
        &self,
        schedule_id: &ObjectId,
        expected_version: i64,
        trade_id: &ObjectId,
        status: TradeStatus,
    ) -> Result<WriteOutcome> {
        let result = self
            .schedules
            .update_one(
                doc! {
                    "_id": *schedule_id,
                    "version": expected_version,
                    "trade_ledger": {
                        "$elemMatch": { "_id": *trade_id, "status": TradeStatus::Open.as_str() }
                    },
                },
                doc! {
                    "$set": {
                        "trade_ledger.$.status": status.as_str(),
                        "metadata.updated_at": DateTime::now(),
                    },
                    "$inc": { "version": 1_i64 },
                },
            )
            .await?;
        Ok(outcome(result.matched_count))
    }

    async fn commit_execution(&self, plan: &ExecutionPlan) -> Result<WriteOutcome> {
        let mut session = self.mongo.start_session().await?;
        session.start_transaction().await?;

        match self.execute_in(&mut session, plan).await {
            Ok(WriteOutcome::Applied) => match session.commit_transaction().await {
                Ok(()) => Ok(WriteOutcome::Applied),
                Err(e) if e.contains_label(mongodb::error::TRANSIENT_TRANSACTION_ERROR) => {
                    debug!(schedule = %plan.schedule_id, "execution commit raced another writer");
                    Ok(WriteOutcome::Stale)
                }
                Err(e) => Err(LedgerError::Database(format!(
                    "execution commit failed: {}",
                    e
                ))),
            },
            Ok(WriteOutcome::Stale) => {
                abort(&mut session, &plan.schedule_id).await;
                Ok(WriteOutcome::Stale)
            }
            Err(LedgerError::Conflict(reason)) => {
                debug!(schedule = %plan.schedule_id, %reason, "execution raced another writer");
                abort(&mut session, &plan.schedule_id).await;
                Ok(WriteOutcome::Stale)
            }
            Err(e) => {
                abort(&mut session, &plan.schedule_id).await;
                Err(e)
            }
        }
    }
}

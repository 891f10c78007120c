//! Trade engine
//!
//! The single entry point for every write to a master schedule. Each
//! operation loads what it needs through the store, runs the pure rules in
//! `trade`, and commits with a version-guarded write. Serialization per
//! schedule follows [`ConcurrencyMode`]:
//!
//! - `Lock`: a per-schedule mutex is held from the first read to the commit.
//! - `Optimistic`: no lock; a stale commit reloads and re-validates.
//!
//! Both modes keep the version guard, so several processes sharing one
//! database stay correct.

mod locks;

pub use locks::ScheduleLocks;

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, warn};

use crate::auth::{GroupRole, RequestIdentity};
use crate::db::schemas::{GroupDoc, UserDoc};
use crate::notify::{NotificationQueue, TradeEventKind, TradeNotification};
use crate::schedule::{MasterSchedule, Schedule};
use crate::store::{ScheduleStore, WriteOutcome};
use crate::trade::{
    decide, plan_execution, validate_trade, ExecutionPlan, FinalizeTradeRequest,
    ParsedTradeRequest, Trade, TradeContext, TradeRequest, TradeStatus, Transition,
    UnknownUnitPolicy,
};
use crate::types::{LedgerError, Result};

/// How concurrent writers to one schedule are serialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencyMode {
    #[default]
    Lock,
    Optimistic,
}

impl FromStr for ConcurrencyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lock" => Ok(Self::Lock),
            "optimistic" => Ok(Self::Optimistic),
            other => Err(format!("unknown concurrency mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper bound on every store call
    pub store_timeout: Duration,
    /// Upper bound on waiting for a schedule lock
    pub lock_timeout: Duration,
    pub concurrency: ConcurrencyMode,
    /// Reloads allowed after a stale write before giving up
    pub max_commit_retries: u32,
    pub unknown_units: UnknownUnitPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout: Duration::from_millis(5000),
            lock_timeout: Duration::from_millis(10_000),
            concurrency: ConcurrencyMode::Lock,
            max_commit_retries: 5,
            unknown_units: UnknownUnitPolicy::Reject,
        }
    }
}

/// A user's trades on one group's active schedule
#[derive(Debug, Clone, Serialize)]
pub struct GroupTrades {
    pub group_id: ObjectId,
    pub schedule_id: ObjectId,
    pub trades: Vec<Trade>,
}

pub struct TradeEngine<S: ScheduleStore + 'static> {
    store: Arc<S>,
    config: EngineConfig,
    locks: ScheduleLocks,
    notifications: Option<NotificationQueue>,
}

impl<S: ScheduleStore + 'static> TradeEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
        Self {
            store,
            config,
            locks: ScheduleLocks::new(),
            notifications: None,
        }
    }

    /// Publish trade notifications after each successful write
    pub fn with_notifications(mut self, queue: NotificationQueue) -> Self {
        self.notifications = Some(queue);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Schedules
    // ------------------------------------------------------------------

    /// Index a generated schedule and store it as the group's active master
    /// schedule. Admins only.
    pub async fn commit_master_schedule(
        &self,
        schedule: Schedule,
        group_id: &ObjectId,
        identity: &RequestIdentity,
    ) -> Result<MasterSchedule> {
        self.require_group_admin(group_id, identity).await?;

        let mut master = MasterSchedule::new(schedule, *group_id)?;
        let id = self
            .bounded("insert schedule", self.store.insert_schedule(master.clone()))
            .await?;
        master._id = Some(id);

        info!(
            schedule = %id,
            group = %group_id,
            units = master.unit_index.len(),
            "master schedule committed"
        );
        Ok(master)
    }

    /// The group's most recently committed master schedule
    pub async fn active_schedule(&self, group_id: &ObjectId) -> Result<MasterSchedule> {
        self.bounded("find active schedule", self.store.find_active_schedule(group_id))
            .await?
            .ok_or_else(|| {
                LedgerError::not_found(format!("group {} has no master schedule", group_id))
            })
    }

    /// Load the group and check that the caller administers it
    pub async fn require_group_admin(
        &self,
        group_id: &ObjectId,
        identity: &RequestIdentity,
    ) -> Result<GroupDoc> {
        let group = self.load_group(group_id).await?;
        if !group.allows(&identity.user_id, GroupRole::Admin) {
            return Err(LedgerError::unauthorized(format!(
                "user {} is not an admin of group {}",
                identity.user_id, group_id
            )));
        }
        Ok(group)
    }

    // ------------------------------------------------------------------
    // Trades
    // ------------------------------------------------------------------

    /// Validate a trade request against the current schedule. Nothing is
    /// written.
    pub async fn create_trade(
        &self,
        request: &TradeRequest,
        identity: &RequestIdentity,
    ) -> Result<Trade> {
        let parsed = request.parse()?;
        let (_, trade) = self.prepare_trade(&parsed, identity).await?;
        Ok(trade)
    }

    /// Validate a trade request and append the trade to the ledger
    pub async fn submit_trade(
        &self,
        request: &TradeRequest,
        identity: &RequestIdentity,
    ) -> Result<Trade> {
        let parsed = request.parse()?;
        let _guard = self.serialize(&parsed.schedule_id).await?;

        for attempt in 0..=self.config.max_commit_retries {
            let (master, trade) = self.prepare_trade(&parsed, identity).await?;
            let outcome = self
                .bounded(
                    "append trade",
                    self.store
                        .append_trade(&parsed.schedule_id, master.version, &trade),
                )
                .await?;

            match outcome {
                WriteOutcome::Applied => {
                    info!(
                        schedule = %parsed.schedule_id,
                        trade = %trade.id,
                        initiator = %trade.initiator_email,
                        executor = %trade.executor_email,
                        "trade proposed"
                    );
                    self.publish(TradeEventKind::Proposed, &parsed.schedule_id, &trade);
                    return Ok(trade);
                }
                WriteOutcome::Stale => {
                    debug!(schedule = %parsed.schedule_id, attempt, "stale ledger append, retrying");
                }
            }
        }

        Err(self.exhausted(&parsed.schedule_id))
    }

    /// Accept, decline or cancel an open trade. Returns the trade's new
    /// status.
    pub async fn finalize_trade(
        &self,
        request: &FinalizeTradeRequest,
        identity: &RequestIdentity,
    ) -> Result<TradeStatus> {
        let (schedule_id, trade_id) = request.parse_ids()?;
        let requester = self.load_requester(identity).await?;
        let _guard = self.serialize(&schedule_id).await?;

        for attempt in 0..=self.config.max_commit_retries {
            let master = self.load_schedule(&schedule_id).await?;
            let trade = master
                .find_trade(&trade_id)
                .ok_or_else(|| LedgerError::not_found(format!("trade {} not found", trade_id)))?;
            let transition = decide(trade, &requester.email, request.action)?;

            let outcome = match transition {
                Transition::Execute => {
                    let plan = plan_execution(&master, &trade_id)?;
                    let outcome = self.commit_plan(plan.clone()).await?;
                    if outcome.is_applied() {
                        self.announce_execution(&master, &plan);
                    }
                    outcome
                }
                Transition::Decline | Transition::Cancel => {
                    let outcome = self
                        .bounded(
                            "set trade status",
                            self.store.set_trade_status(
                                &schedule_id,
                                master.version,
                                &trade_id,
                                transition.target(),
                            ),
                        )
                        .await?;
                    if outcome.is_applied() {
                        info!(
                            schedule = %schedule_id,
                            trade = %trade_id,
                            status = %transition.target(),
                            "trade closed"
                        );
                        let kind = match transition {
                            Transition::Cancel => TradeEventKind::Cancelled,
                            _ => TradeEventKind::Declined,
                        };
                        self.publish(kind, &schedule_id, trade);
                    }
                    outcome
                }
            };

            match outcome {
                WriteOutcome::Applied => return Ok(transition.target()),
                WriteOutcome::Stale => {
                    debug!(schedule = %schedule_id, trade = %trade_id, attempt, "stale finalize, retrying");
                }
            }
        }

        Err(self.exhausted(&schedule_id))
    }

    /// Trades the caller is part of, on the active schedule of each of
    /// their groups
    pub async fn user_trades(&self, identity: &RequestIdentity) -> Result<Vec<GroupTrades>> {
        let user = self.load_requester(identity).await?;

        let mut result = Vec::with_capacity(user.groups.len());
        for group_id in &user.groups {
            let Some(master) = self
                .bounded("find active schedule", self.store.find_active_schedule(group_id))
                .await?
            else {
                continue;
            };
            result.push(GroupTrades {
                group_id: *group_id,
                schedule_id: master.id()?,
                trades: master.trades_involving(&user.email).cloned().collect(),
            });
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    async fn prepare_trade(
        &self,
        request: &ParsedTradeRequest,
        identity: &RequestIdentity,
    ) -> Result<(MasterSchedule, Trade)> {
        let master = self.load_schedule(&request.schedule_id).await?;
        let initiator = self.load_user_by_email(&request.initiator_email).await?;
        let executor = self.load_user_by_email(&request.executor_email).await?;
        let group = self.load_group(&master.group_id).await?;

        let trade = validate_trade(
            request,
            TradeContext {
                schedule: &master,
                group: &group,
                initiator: &initiator,
                executor: &executor,
            },
            identity,
            self.config.unknown_units,
        )?;
        Ok((master, trade))
    }

    /// Commit on a detached task so a caller that goes away cannot cut the
    /// transaction short. The store timeout still applies inside the task.
    async fn commit_plan(&self, plan: ExecutionPlan) -> Result<WriteOutcome> {
        let store = Arc::clone(&self.store);
        let timeout = self.config.store_timeout;
        let schedule_id = plan.schedule_id;

        let task = tokio::spawn(async move {
            match tokio::time::timeout(timeout, store.commit_execution(&plan)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(LedgerError::Timeout(format!(
                    "commit execution exceeded {:?}",
                    timeout
                ))),
            }
        });

        task.await.map_err(|e| {
            LedgerError::Database(format!(
                "execution task for schedule {} failed: {}",
                schedule_id, e
            ))
        })?
    }

    fn announce_execution(&self, master: &MasterSchedule, plan: &ExecutionPlan) {
        info!(
            schedule = %plan.schedule_id,
            trade = %plan.trade_id,
            units = plan.units.len(),
            voided = plan.voided.len(),
            "trade executed"
        );
        if let Some(trade) = master.find_trade(&plan.trade_id) {
            self.publish(TradeEventKind::Executed, &plan.schedule_id, trade);
        }
        for voided in plan.voided.iter().filter_map(|id| master.find_trade(id)) {
            self.publish(TradeEventKind::Voided, &plan.schedule_id, voided);
        }
    }

    fn publish(&self, kind: TradeEventKind, schedule_id: &ObjectId, trade: &Trade) {
        if let Some(queue) = &self.notifications {
            queue.publish(TradeNotification::for_trade(kind, schedule_id, trade));
        }
    }

    async fn serialize(&self, schedule_id: &ObjectId) -> Result<Option<OwnedMutexGuard<()>>> {
        match self.config.concurrency {
            ConcurrencyMode::Lock => Ok(Some(
                self.locks
                    .acquire(schedule_id, self.config.lock_timeout)
                    .await?,
            )),
            ConcurrencyMode::Optimistic => Ok(None),
        }
    }

    fn exhausted(&self, schedule_id: &ObjectId) -> LedgerError {
        warn!(
            schedule = %schedule_id,
            retries = self.config.max_commit_retries,
            "giving up after repeated stale writes"
        );
        LedgerError::Conflict("schedule modified concurrently".into())
    }

    async fn bounded<T, F>(&self, op: &str, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.config.store_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op, timeout = ?self.config.store_timeout, "store call timed out");
                Err(LedgerError::Timeout(format!(
                    "{} exceeded {:?}",
                    op, self.config.store_timeout
                )))
            }
        }
    }

    async fn load_schedule(&self, id: &ObjectId) -> Result<MasterSchedule> {
        self.bounded("find schedule", self.store.find_schedule(id))
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("master schedule {} not found", id)))
    }

    async fn load_user_by_email(&self, email: &str) -> Result<UserDoc> {
        self.bounded("find user", self.store.find_user_by_email(email))
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("user {} not found", email)))
    }

    async fn load_group(&self, id: &ObjectId) -> Result<GroupDoc> {
        self.bounded("find group", self.store.find_group(id))
            .await?
            .ok_or_else(|| LedgerError::not_found(format!("group {} not found", id)))
    }

    /// The caller's own record; a token for a user that does not exist is
    /// not a valid identity
    async fn load_requester(&self, identity: &RequestIdentity) -> Result<UserDoc> {
        self.bounded("find user", self.store.find_user(&identity.user_id))
            .await?
            .ok_or_else(|| LedgerError::unauthorized("unknown requesting user"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concurrency_mode_from_str() {
        assert_eq!("lock".parse::<ConcurrencyMode>(), Ok(ConcurrencyMode::Lock));
        assert_eq!(
            " Optimistic ".parse::<ConcurrencyMode>(),
            Ok(ConcurrencyMode::Optimistic)
        );
        assert!("none".parse::<ConcurrencyMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.concurrency, ConcurrencyMode::Lock);
        assert_eq!(config.unknown_units, UnknownUnitPolicy::Reject);
        assert_eq!(config.max_commit_retries, 5);
    }
}

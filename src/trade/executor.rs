//! Trade execution
//!
//! Accepting a trade does three things that must land together:
//! void every other open trade sharing a unit, swap ownership of the
//! traded units in both index and schedule, and mark the trade executed.
//! [`plan_execution`] computes the result on copies; a store applies the
//! plan in one atomic write guarded by the version it was computed from.

use bson::oid::ObjectId;
use tracing::debug;

use super::{Trade, TradeStatus};
use crate::schedule::{MasterSchedule, OwnershipIndex, Schedule, UnitId};
use crate::types::{LedgerError, Result};

/// Fully computed outcome of accepting one trade
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub schedule_id: ObjectId,
    /// Version the plan was computed from; the commit must see it unchanged
    pub expected_version: i64,
    pub trade_id: ObjectId,
    /// Open trades displaced by this execution
    pub voided: Vec<ObjectId>,
    pub units: Vec<UnitId>,
    pub schedule: Schedule,
    pub unit_index: OwnershipIndex,
}

/// Compute the execution of `trade_id` against `master`.
///
/// Fails without side effects when the trade is missing or no longer open,
/// or when any traded unit has a corrupt index position.
pub fn plan_execution(master: &MasterSchedule, trade_id: &ObjectId) -> Result<ExecutionPlan> {
    let schedule_id = master.id()?;
    let trade = master
        .find_trade(trade_id)
        .ok_or_else(|| LedgerError::not_found(format!("trade {} not found", trade_id)))?;
    if !trade.is_open() {
        return Err(LedgerError::validation("trade is void or cancelled"));
    }

    let traded = trade.unit_set();
    let voided: Vec<ObjectId> = master
        .open_trades()
        .filter(|other| other.id != trade.id && other.touches(&traded))
        .map(|other| other.id)
        .collect();

    let mut schedule = master.schedule.clone();
    let mut unit_index = master.unit_index.clone();
    swap_owners(trade, &mut schedule, &mut unit_index)?;

    Ok(ExecutionPlan {
        schedule_id,
        expected_version: master.version,
        trade_id: trade.id,
        voided,
        units: trade.units().cloned().collect(),
        schedule,
        unit_index,
    })
}

fn swap_owners(trade: &Trade, schedule: &mut Schedule, index: &mut OwnershipIndex) -> Result<()> {
    for unit in &trade.initiator_units {
        if !index.reassign(schedule, unit, &trade.executor_email)? {
            debug!(%unit, trade = %trade.id, "skipping unit outside the ownership index");
        }
    }
    for unit in &trade.executor_units {
        if !index.reassign(schedule, unit, &trade.initiator_email)? {
            debug!(%unit, trade = %trade.id, "skipping unit outside the ownership index");
        }
    }
    Ok(())
}

impl ExecutionPlan {
    /// Apply the plan to an in-memory aggregate. The caller has already
    /// checked the version and holds exclusive access.
    pub(crate) fn apply_to(&self, master: &mut MasterSchedule) -> Result<()> {
        match master.find_trade(&self.trade_id) {
            Some(t) if t.is_open() => {}
            Some(_) => return Err(LedgerError::validation("trade is void or cancelled")),
            None => {
                return Err(LedgerError::not_found(format!(
                    "trade {} not found",
                    self.trade_id
                )))
            }
        }

        for trade in master.trade_ledger.iter_mut() {
            if trade.id == self.trade_id {
                trade.status = TradeStatus::Executed;
            } else if trade.is_open() && self.voided.contains(&trade.id) {
                trade.status = TradeStatus::Void;
            }
        }
        master.schedule = self.schedule.clone();
        master.unit_index = self.unit_index.clone();
        master.version += 1;
        master.metadata.touch();
        Ok(())
    }
}

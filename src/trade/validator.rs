//! Trade creation rules
//!
//! Runs after the engine has loaded the schedule, both users and the
//! owning group. Every check happens before anything is written.

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::debug;

use super::{ParsedTradeRequest, Trade, TradeStatus};
use crate::auth::RequestIdentity;
use crate::db::schemas::{GroupDoc, UserDoc};
use crate::schedule::{MasterSchedule, UnitId};
use crate::types::{LedgerError, Result};

/// What to do with unit ids the ownership index has never seen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UnknownUnitPolicy {
    /// Refuse the trade
    #[default]
    Reject,
    /// Carry the id on the trade; execution skips it
    PassThrough,
}

impl FromStr for UnknownUnitPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(Self::Reject),
            "pass-through" | "passthrough" => Ok(Self::PassThrough),
            other => Err(format!("unknown unit policy: {}", other)),
        }
    }
}

/// Everything the rules look at
#[derive(Debug, Clone, Copy)]
pub struct TradeContext<'a> {
    pub schedule: &'a MasterSchedule,
    pub group: &'a GroupDoc,
    pub initiator: &'a UserDoc,
    pub executor: &'a UserDoc,
}

/// Apply the creation rules and build an open trade.
pub fn validate_trade(
    request: &ParsedTradeRequest,
    ctx: TradeContext<'_>,
    identity: &RequestIdentity,
    policy: UnknownUnitPolicy,
) -> Result<Trade> {
    let initiator_id = ctx
        .initiator
        ._id
        .ok_or_else(|| LedgerError::Consistency("initiator record has no id".into()))?;
    let executor_id = ctx
        .executor
        ._id
        .ok_or_else(|| LedgerError::Consistency("executor record has no id".into()))?;

    if initiator_id != identity.user_id {
        return Err(LedgerError::unauthorized("trade must be made by initiator"));
    }

    if !ctx.group.has_member(&initiator_id) || !ctx.group.has_member(&executor_id) {
        return Err(LedgerError::validation(
            "one trade member does not belong to group",
        ));
    }

    check_ownership(
        ctx.schedule,
        &request.initiator_units,
        &ctx.initiator.email,
        policy,
    )?;
    check_ownership(
        ctx.schedule,
        &request.executor_units,
        &ctx.executor.email,
        policy,
    )?;

    Ok(Trade {
        id: ObjectId::new(),
        created_at: DateTime::now(),
        initiator_email: ctx.initiator.email.clone(),
        executor_email: ctx.executor.email.clone(),
        initiator_units: request.initiator_units.clone(),
        executor_units: request.executor_units.clone(),
        status: TradeStatus::Open,
    })
}

fn check_ownership(
    schedule: &MasterSchedule,
    units: &[UnitId],
    claimant: &str,
    policy: UnknownUnitPolicy,
) -> Result<()> {
    for unit in units {
        match schedule.unit_index.owner_of(unit) {
            Some(owner) if owner == claimant => {}
            Some(owner) => {
                return Err(LedgerError::validation(format!(
                    "{} not owned by {} (owner is {})",
                    unit, claimant, owner
                )))
            }
            None if policy == UnknownUnitPolicy::PassThrough => {
                debug!(%unit, "passing through unit missing from ownership index");
            }
            None => {
                return Err(LedgerError::validation(format!(
                    "{} is not a unit of this schedule",
                    unit
                )))
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::fixtures;
    use crate::types::ErrorCategory;

    const ALICE: &str = "alice@example.com";
    const BOB: &str = "bob@example.com";

    struct World {
        schedule: MasterSchedule,
        group: GroupDoc,
        alice: UserDoc,
        bob: UserDoc,
        alice_unit: UnitId,
        bob_unit: UnitId,
    }

    fn world() -> World {
        let generated = fixtures::schedule(&[ALICE, BOB], 1);
        let alice_unit = generated.seasons[0].blocks[0].units[0].id.clone();
        let bob_unit = generated.seasons[1].blocks[0].units[0].id.clone();

        let mut alice = UserDoc::new(ALICE);
        alice._id = Some(ObjectId::new());
        let mut bob = UserDoc::new(BOB);
        bob._id = Some(ObjectId::new());

        let mut group = GroupDoc::new("cabin", vec![alice._id.unwrap()]).with_members(bob._id);
        group._id = Some(ObjectId::new());

        let mut schedule = MasterSchedule::new(generated, group._id.unwrap()).unwrap();
        schedule._id = Some(ObjectId::new());

        World {
            schedule,
            group,
            alice,
            bob,
            alice_unit,
            bob_unit,
        }
    }

    fn request(w: &World, give: Vec<UnitId>, get: Vec<UnitId>) -> ParsedTradeRequest {
        ParsedTradeRequest {
            schedule_id: w.schedule._id.unwrap(),
            initiator_email: ALICE.into(),
            executor_email: BOB.into(),
            initiator_units: give,
            executor_units: get,
        }
    }

    fn ctx(w: &World) -> TradeContext<'_> {
        TradeContext {
            schedule: &w.schedule,
            group: &w.group,
            initiator: &w.alice,
            executor: &w.bob,
        }
    }

    fn as_alice(w: &World) -> RequestIdentity {
        RequestIdentity::new(w.alice._id.unwrap())
    }

    #[test]
    fn test_valid_trade_is_open() {
        let w = world();
        let req = request(&w, vec![w.alice_unit.clone()], vec![w.bob_unit.clone()]);
        let trade = validate_trade(&req, ctx(&w), &as_alice(&w), UnknownUnitPolicy::Reject).unwrap();

        assert_eq!(trade.status, TradeStatus::Open);
        assert_eq!(trade.initiator_email, ALICE);
        assert_eq!(trade.executor_units, vec![w.bob_unit.clone()]);
    }

    #[test]
    fn test_requester_must_be_initiator() {
        let w = world();
        let req = request(&w, vec![w.alice_unit.clone()], vec![w.bob_unit.clone()]);
        let as_bob = RequestIdentity::new(w.bob._id.unwrap());

        let err = validate_trade(&req, ctx(&w), &as_bob, UnknownUnitPolicy::Reject).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Unauthorized);
        assert!(err.to_string().contains("made by initiator"));
    }

    #[test]
    fn test_members_only() {
        let mut w = world();
        w.group.members.retain(|m| Some(*m) != w.bob._id);
        let req = request(&w, vec![w.alice_unit.clone()], vec![w.bob_unit.clone()]);

        let err = validate_trade(&req, ctx(&w), &as_alice(&w), UnknownUnitPolicy::Reject).unwrap_err();
        assert!(err.to_string().contains("does not belong to group"));
    }

    #[test]
    fn test_initiator_must_own_offered_units() {
        let w = world();
        let req = request(&w, vec![w.bob_unit.clone()], vec![w.alice_unit.clone()]);

        let err = validate_trade(&req, ctx(&w), &as_alice(&w), UnknownUnitPolicy::Reject).unwrap_err();
        assert_eq!(err.category(), ErrorCategory::Validation);
        assert!(err.to_string().contains(w.bob_unit.as_str()));
        assert!(err.to_string().contains("not owned by alice@example.com"));
    }

    #[test]
    fn test_unknown_units_follow_policy() {
        let w = world();
        let foreign = UnitId::new_v4();
        let req = request(&w, vec![w.alice_unit.clone(), foreign.clone()], vec![w.bob_unit.clone()]);

        let err = validate_trade(&req, ctx(&w), &as_alice(&w), UnknownUnitPolicy::Reject).unwrap_err();
        assert!(err.to_string().contains("not a unit of this schedule"));

        let trade =
            validate_trade(&req, ctx(&w), &as_alice(&w), UnknownUnitPolicy::PassThrough).unwrap();
        assert!(trade.initiator_units.contains(&foreign));
    }

    #[test]
    fn test_policy_from_str() {
        assert_eq!(
            "reject".parse::<UnknownUnitPolicy>(),
            Ok(UnknownUnitPolicy::Reject)
        );
        assert_eq!(
            "Pass-Through".parse::<UnknownUnitPolicy>(),
            Ok(UnknownUnitPolicy::PassThrough)
        );
        assert!("lenient".parse::<UnknownUnitPolicy>().is_err());
    }
}

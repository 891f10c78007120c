//! Trades between two group members
//!
//! - `request`: caller-facing request shapes and input checks
//! - `validator`: ownership and membership rules that gate creation
//! - `state`: the status machine for finalize calls
//! - `executor`: conflict voiding and ownership reassignment on accept

pub mod executor;
pub mod request;
pub mod state;
pub mod validator;

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::schedule::UnitId;

pub use executor::{plan_execution, ExecutionPlan};
pub use request::{FinalizeAction, FinalizeTradeRequest, ParsedTradeRequest, TradeRequest};
pub use state::{decide, TradeRole, Transition};
pub use validator::{validate_trade, TradeContext, UnknownUnitPolicy};

/// Lifecycle status. `Open` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TradeStatus {
    #[default]
    Open,
    Executed,
    /// Declined by the executor or displaced by a conflicting execution
    Void,
    /// Withdrawn by the initiator
    Cancelled,
}

impl TradeStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, TradeStatus::Open)
    }

    /// Stored representation
    pub fn as_str(self) -> &'static str {
        match self {
            TradeStatus::Open => "open",
            TradeStatus::Executed => "executed",
            TradeStatus::Void => "void",
            TradeStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Ledger entry
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Trade {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub created_at: DateTime,
    pub initiator_email: String,
    pub executor_email: String,
    /// Units the initiator gives away
    pub initiator_units: Vec<UnitId>,
    /// Units the initiator receives
    pub executor_units: Vec<UnitId>,
    #[serde(default)]
    pub status: TradeStatus,
}

impl Trade {
    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Both sides of the trade
    pub fn units(&self) -> impl Iterator<Item = &UnitId> {
        self.initiator_units.iter().chain(self.executor_units.iter())
    }

    pub fn unit_set(&self) -> HashSet<&UnitId> {
        self.units().collect()
    }

    /// Whether this trade references any unit in `units`
    pub fn touches(&self, units: &HashSet<&UnitId>) -> bool {
        self.units().any(|u| units.contains(u))
    }

    pub fn involves(&self, email: &str) -> bool {
        self.initiator_email == email || self.executor_email == email
    }

    pub fn role_of(&self, email: &str) -> Option<TradeRole> {
        if self.executor_email == email {
            Some(TradeRole::Executor)
        } else if self.initiator_email == email {
            Some(TradeRole::Initiator)
        } else {
            None
        }
    }
}

//! Master schedule aggregate
//!
//! One committed schedule for a group: the nested calendar, its ownership
//! index and the trade ledger. `version` increases with every write so
//! that concurrent writers can detect that they read stale state.

use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

use super::{build_ownership_index, OwnershipIndex, Schedule};
use crate::db::schemas::Metadata;
use crate::trade::Trade;
use crate::types::{LedgerError, Result};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct MasterSchedule {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub group_id: ObjectId,

    /// Recency key: the newest schedule of a group is the active one
    pub created_at: DateTime,

    #[serde(default)]
    pub version: i64,

    pub schedule: Schedule,

    pub unit_index: OwnershipIndex,

    /// Chronological
    #[serde(default)]
    pub trade_ledger: Vec<Trade>,
}

impl MasterSchedule {
    /// Build an unsaved master schedule from a generated schedule
    pub fn new(schedule: Schedule, group_id: ObjectId) -> Result<Self> {
        let unit_index = build_ownership_index(&schedule)?;
        Ok(Self {
            _id: None,
            metadata: Metadata::new(),
            group_id,
            created_at: DateTime::now(),
            version: 0,
            schedule,
            unit_index,
            trade_ledger: Vec::new(),
        })
    }

    /// Stored id; an unsaved schedule here is a programming error
    pub fn id(&self) -> Result<ObjectId> {
        self._id
            .ok_or_else(|| LedgerError::Consistency("master schedule has not been stored".into()))
    }

    pub fn find_trade(&self, trade_id: &ObjectId) -> Option<&Trade> {
        self.trade_ledger.iter().find(|t| t.id == *trade_id)
    }

    pub(crate) fn find_trade_mut(&mut self, trade_id: &ObjectId) -> Option<&mut Trade> {
        self.trade_ledger.iter_mut().find(|t| t.id == *trade_id)
    }

    /// Trades where `email` is initiator or executor, oldest first
    pub fn trades_involving<'a>(&'a self, email: &'a str) -> impl Iterator<Item = &'a Trade> + 'a {
        self.trade_ledger.iter().filter(move |t| t.involves(email))
    }

    pub fn open_trades(&self) -> impl Iterator<Item = &Trade> {
        self.trade_ledger.iter().filter(|t| t.is_open())
    }
}

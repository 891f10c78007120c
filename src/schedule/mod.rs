//! Generated schedules and their ownership index
//!
//! The nested calendar (seasons → blocks → units) comes from the external
//! generator. We only read it, except for the participant of each unit,
//! which trade execution rewrites through the ownership index.

pub mod index;
pub mod master;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::types::{LedgerError, Result};

pub use index::{build_ownership_index, IndexedUnit, OwnershipIndex};
pub use master::MasterSchedule;

/// Stable identifier of a schedule unit (canonical lowercase UUID text)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UnitId(String);

impl UnitId {
    /// Parse a caller-supplied identifier
    pub fn parse(raw: &str) -> Result<Self> {
        Uuid::parse_str(raw.trim())
            .map(Self::from)
            .map_err(|_| LedgerError::validation(format!("{} is not a valid unit id", raw)))
    }

    pub fn new_v4() -> Self {
        Self::from(Uuid::new_v4())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Uuid> for UnitId {
    fn from(id: Uuid) -> Self {
        Self(id.hyphenated().to_string())
    }
}

impl TryFrom<String> for UnitId {
    type Error = LedgerError;

    fn try_from(raw: String) -> Result<Self> {
        Self::parse(&raw)
    }
}

impl From<UnitId> for String {
    fn from(id: UnitId) -> Self {
        id.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Generated schedule: an ordered list of seasons
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Schedule {
    pub seasons: Vec<Season>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Season {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    pub blocks: Vec<Block>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Block {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<DateTime<Utc>>,
    pub units: Vec<ScheduleUnit>,
}

/// Smallest assignable slot
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ScheduleUnit {
    pub id: UnitId,
    pub start: DateTime<Utc>,
    /// Current owner (email)
    pub participant: String,
}

/// Coordinates of a unit inside the nested schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitPosition {
    pub season: usize,
    pub block: usize,
    pub unit: usize,
}

impl UnitPosition {
    pub fn new(season: usize, block: usize, unit: usize) -> Self {
        Self {
            season,
            block,
            unit,
        }
    }

    /// Persisted form: `[season, block, unit]`
    pub fn to_triple(self) -> Vec<u32> {
        vec![self.season as u32, self.block as u32, self.unit as u32]
    }

    /// Decode a persisted triple. Anything but three components means the
    /// index is corrupt.
    pub fn from_triple(raw: &[u32]) -> Result<Self> {
        match raw {
            [season, block, unit] => Ok(Self::new(
                *season as usize,
                *block as usize,
                *unit as usize,
            )),
            _ => Err(LedgerError::Consistency(format!(
                "schedule unit position must have 3 components, found {}",
                raw.len()
            ))),
        }
    }
}

impl fmt::Display for UnitPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.season, self.block, self.unit)
    }
}

impl Schedule {
    /// Every unit with its coordinates, in schedule order
    pub fn units(&self) -> impl Iterator<Item = (UnitPosition, &ScheduleUnit)> {
        self.seasons.iter().enumerate().flat_map(|(i, season)| {
            season.blocks.iter().enumerate().flat_map(move |(j, block)| {
                block
                    .units
                    .iter()
                    .enumerate()
                    .map(move |(k, unit)| (UnitPosition::new(i, j, k), unit))
            })
        })
    }

    pub fn unit_count(&self) -> usize {
        self.seasons
            .iter()
            .flat_map(|s| s.blocks.iter())
            .map(|b| b.units.len())
            .sum()
    }

    pub fn unit_at(&self, pos: UnitPosition) -> Option<&ScheduleUnit> {
        self.seasons
            .get(pos.season)?
            .blocks
            .get(pos.block)?
            .units
            .get(pos.unit)
    }

    pub(crate) fn unit_at_mut(&mut self, pos: UnitPosition) -> Option<&mut ScheduleUnit> {
        self.seasons
            .get_mut(pos.season)?
            .blocks
            .get_mut(pos.block)?
            .units
            .get_mut(pos.unit)
    }
}

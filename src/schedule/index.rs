//! Ownership index
//!
//! Flat map from unit id to owner, start and position in the nested
//! schedule. The index and the schedule are two halves of one structure:
//! the only writer is [`OwnershipIndex::reassign`], which updates both.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::error;

use super::{Schedule, UnitId, UnitPosition};
use crate::types::{LedgerError, Result};

/// Index entry for one unit
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct IndexedUnit {
    pub owner: String,
    pub start: DateTime<Utc>,
    /// `[season, block, unit]`
    pub position: Vec<u32>,
}

impl IndexedUnit {
    pub fn position(&self) -> Result<UnitPosition> {
        UnitPosition::from_triple(&self.position)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
#[serde(transparent)]
pub struct OwnershipIndex {
    units: HashMap<UnitId, IndexedUnit>,
}

/// Flatten a generated schedule into its ownership index.
///
/// A repeated unit id means the generator broke its uniqueness guarantee;
/// that is reported as a corrupt schedule, never repaired.
pub fn build_ownership_index(schedule: &Schedule) -> Result<OwnershipIndex> {
    let mut units = HashMap::with_capacity(schedule.unit_count());

    for (pos, unit) in schedule.units() {
        let entry = IndexedUnit {
            owner: unit.participant.clone(),
            start: unit.start,
            position: pos.to_triple(),
        };
        if let Some(previous) = units.insert(unit.id.clone(), entry) {
            error!(unit = %unit.id, first = ?previous.position, second = %pos, "duplicate unit id in generated schedule");
            return Err(LedgerError::Consistency(format!(
                "corrupt schedule: unit {} appears more than once",
                unit.id
            )));
        }
    }

    Ok(OwnershipIndex { units })
}

impl OwnershipIndex {
    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, unit: &UnitId) -> Option<&IndexedUnit> {
        self.units.get(unit)
    }

    pub fn contains(&self, unit: &UnitId) -> bool {
        self.units.contains_key(unit)
    }

    pub fn owner_of(&self, unit: &UnitId) -> Option<&str> {
        self.units.get(unit).map(|u| u.owner.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&UnitId, &IndexedUnit)> {
        self.units.iter()
    }

    /// Units currently owned by `email`, ordered by start time
    pub fn units_owned_by(&self, email: &str) -> Vec<&UnitId> {
        let mut owned: Vec<_> = self
            .units
            .iter()
            .filter(|(_, u)| u.owner == email)
            .collect();
        owned.sort_by_key(|(_, u)| u.start);
        owned.into_iter().map(|(id, _)| id).collect()
    }

    /// Move `unit` to `owner` in both the index and the nested schedule.
    ///
    /// Returns `Ok(false)` when the unit is not indexed. A position that is
    /// malformed, out of range, or pointing at a different unit is a
    /// consistency error and nothing is changed.
    pub(crate) fn reassign(
        &mut self,
        schedule: &mut Schedule,
        unit: &UnitId,
        owner: &str,
    ) -> Result<bool> {
        let Some(entry) = self.units.get_mut(unit) else {
            return Ok(false);
        };
        let pos = entry.position()?;

        let slot = schedule.unit_at_mut(pos).ok_or_else(|| {
            LedgerError::Consistency(format!(
                "index position {} for unit {} is outside the schedule",
                pos, unit
            ))
        })?;
        if slot.id != *unit {
            return Err(LedgerError::Consistency(format!(
                "index position {} for unit {} holds unit {}",
                pos, unit, slot.id
            )));
        }

        slot.participant = owner.to_string();
        entry.owner = owner.to_string();
        Ok(true)
    }

    /// Check that every scheduled unit is indexed at its own position with
    /// the same owner, and that nothing else is indexed.
    pub fn verify(&self, schedule: &Schedule) -> Result<()> {
        let mut seen = 0;
        for (pos, unit) in schedule.units() {
            let entry = self.units.get(&unit.id).ok_or_else(|| {
                LedgerError::Consistency(format!("unit {} missing from index", unit.id))
            })?;
            if entry.position()? != pos {
                return Err(LedgerError::Consistency(format!(
                    "unit {} indexed at {:?} but scheduled at {}",
                    unit.id, entry.position, pos
                )));
            }
            if entry.owner != unit.participant {
                return Err(LedgerError::Consistency(format!(
                    "unit {} owned by {} in index but {} in schedule",
                    unit.id, entry.owner, unit.participant
                )));
            }
            seen += 1;
        }
        if seen != self.units.len() {
            return Err(LedgerError::Consistency(format!(
                "index holds {} units, schedule holds {}",
                self.units.len(),
                seen
            )));
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn entry_mut(&mut self, unit: &UnitId) -> Option<&mut IndexedUnit> {
        self.units.get_mut(unit)
    }
}

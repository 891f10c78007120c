//! Trade request shapes
//!
//! Raw requests arrive as strings from the request layer; `parse` turns
//! them into typed values or a validation error before anything touches
//! the store.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::schedule::UnitId;
use crate::types::{parse_object_id, LedgerError, Result};

/// Request to open a trade on a master schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeRequest {
    pub schedule_id: String,
    pub initiator_email: String,
    pub executor_email: String,
    /// Units the initiator offers
    pub initiator_units: Vec<String>,
    /// Units the initiator asks for
    pub executor_units: Vec<String>,
}

/// A trade request that passed input checks
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedTradeRequest {
    pub schedule_id: ObjectId,
    pub initiator_email: String,
    pub executor_email: String,
    pub initiator_units: Vec<UnitId>,
    pub executor_units: Vec<UnitId>,
}

impl TradeRequest {
    pub fn parse(&self) -> Result<ParsedTradeRequest> {
        let schedule_id = parse_object_id(&self.schedule_id, "scheduleId")?;

        let initiator_email = self.initiator_email.trim();
        let executor_email = self.executor_email.trim();
        if initiator_email.is_empty() {
            return Err(LedgerError::validation("missing initiator email"));
        }
        if executor_email.is_empty() {
            return Err(LedgerError::validation("missing executor email"));
        }
        if initiator_email == executor_email {
            return Err(LedgerError::validation("initiator and executor must differ"));
        }

        if self.initiator_units.is_empty() {
            return Err(LedgerError::validation(
                "must have at least one unit to trade away",
            ));
        }
        if self.executor_units.is_empty() {
            return Err(LedgerError::validation(
                "must have at least one unit to trade for",
            ));
        }

        let initiator_units = parse_units(&self.initiator_units)?;
        let executor_units = parse_units(&self.executor_units)?;

        let offered: HashSet<&UnitId> = initiator_units.iter().collect();
        if let Some(both) = executor_units.iter().find(|u| offered.contains(u)) {
            return Err(LedgerError::validation(format!(
                "unit {} listed on both sides of the trade",
                both
            )));
        }

        Ok(ParsedTradeRequest {
            schedule_id,
            initiator_email: initiator_email.to_string(),
            executor_email: executor_email.to_string(),
            initiator_units,
            executor_units,
        })
    }
}

/// Parse and de-duplicate, keeping first-seen order
fn parse_units(raw: &[String]) -> Result<Vec<UnitId>> {
    let mut seen = HashSet::new();
    let mut units = Vec::with_capacity(raw.len());
    for id in raw {
        let unit = UnitId::parse(id)?;
        if seen.insert(unit.clone()) {
            units.push(unit);
        }
    }
    Ok(units)
}

/// Executor accepts; executor declines or initiator withdraws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "RawAction")]
pub enum FinalizeAction {
    Accept,
    Decline,
}

/// Wire forms: `"accept"` / `"decline"`, or the legacy codes 1 / 0
#[derive(Deserialize)]
#[serde(untagged)]
enum RawAction {
    Code(i64),
    Name(String),
}

impl TryFrom<RawAction> for FinalizeAction {
    type Error = LedgerError;

    fn try_from(raw: RawAction) -> Result<Self> {
        match raw {
            RawAction::Code(code) => Self::try_from(code),
            RawAction::Name(name) => name.parse(),
        }
    }
}

impl TryFrom<i64> for FinalizeAction {
    type Error = LedgerError;

    fn try_from(code: i64) -> Result<Self> {
        match code {
            1 => Ok(Self::Accept),
            0 => Ok(Self::Decline),
            other => Err(LedgerError::validation(format!(
                "action should be 0 (decline/cancel) or 1 (accept), got {}",
                other
            ))),
        }
    }
}

impl std::str::FromStr for FinalizeAction {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "decline" | "cancel" => Ok(Self::Decline),
            other => Err(LedgerError::validation(format!(
                "action should be accept or decline, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for FinalizeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FinalizeAction::Accept => write!(f, "accept"),
            FinalizeAction::Decline => write!(f, "decline"),
        }
    }
}

/// Request to accept, decline or cancel an open trade
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeTradeRequest {
    pub schedule_id: String,
    pub trade_id: String,
    pub action: FinalizeAction,
}

impl FinalizeTradeRequest {
    pub fn new(schedule_id: ObjectId, trade_id: ObjectId, action: FinalizeAction) -> Self {
        Self {
            schedule_id: schedule_id.to_hex(),
            trade_id: trade_id.to_hex(),
            action,
        }
    }

    /// `(schedule_id, trade_id)`
    pub fn parse_ids(&self) -> Result<(ObjectId, ObjectId)> {
        Ok((
            parse_object_id(&self.schedule_id, "scheduleId")?,
            parse_object_id(&self.trade_id, "tradeId")?,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(initiator_units: Vec<String>, executor_units: Vec<String>) -> TradeRequest {
        TradeRequest {
            schedule_id: ObjectId::new().to_hex(),
            initiator_email: "alice@example.com".into(),
            executor_email: "bob@example.com".into(),
            initiator_units,
            executor_units,
        }
    }

    #[test]
    fn test_parse_dedupes_units() {
        let u1 = UnitId::new_v4().to_string();
        let u2 = UnitId::new_v4().to_string();
        let parsed = request(vec![u1.clone(), u1.clone()], vec![u2.clone()])
            .parse()
            .unwrap();
        assert_eq!(parsed.initiator_units.len(), 1);
        assert_eq!(parsed.executor_units[0].as_str(), u2);
    }

    #[test]
    fn test_parse_rejects_empty_sides() {
        let u1 = UnitId::new_v4().to_string();
        let err = request(vec![], vec![u1.clone()]).parse().unwrap_err();
        assert!(err.to_string().contains("trade away"));
        let err = request(vec![u1], vec![]).parse().unwrap_err();
        assert!(err.to_string().contains("trade for"));
    }

    #[test]
    fn test_parse_rejects_overlap() {
        let u1 = UnitId::new_v4().to_string();
        let err = request(vec![u1.clone()], vec![u1.to_uppercase()])
            .parse()
            .unwrap_err();
        assert!(err.to_string().contains("both sides"));
    }

    #[test]
    fn test_parse_rejects_self_trade_and_bad_ids() {
        let u1 = UnitId::new_v4().to_string();
        let u2 = UnitId::new_v4().to_string();

        let mut req = request(vec![u1.clone()], vec![u2.clone()]);
        req.executor_email = " alice@example.com ".into();
        assert!(req.parse().is_err());

        let req = request(vec!["bogus".into()], vec![u2.clone()]);
        assert!(req.parse().unwrap_err().to_string().contains("not a valid unit id"));

        let mut req = request(vec![u1], vec![u2]);
        req.schedule_id = String::new();
        assert_eq!(
            req.parse().unwrap_err().to_string(),
            "Validation error: missing scheduleId"
        );
    }

    #[test]
    fn test_action_wire_forms() {
        let a: FinalizeAction = serde_json::from_str("\"accept\"").unwrap();
        assert_eq!(a, FinalizeAction::Accept);
        let a: FinalizeAction = serde_json::from_str("0").unwrap();
        assert_eq!(a, FinalizeAction::Decline);
        assert!(serde_json::from_str::<FinalizeAction>("2").is_err());
        assert!(serde_json::from_str::<FinalizeAction>("\"maybe\"").is_err());
        assert_eq!(
            serde_json::to_string(&FinalizeAction::Decline).unwrap(),
            "\"decline\""
        );
    }

    #[test]
    fn test_finalize_request_ids() {
        let (s, t) = (ObjectId::new(), ObjectId::new());
        let req = FinalizeTradeRequest::new(s, t, FinalizeAction::Accept);
        assert_eq!(req.parse_ids().unwrap(), (s, t));

        let json = r#"{"scheduleId":"nope","tradeId":"","action":1}"#;
        let req: FinalizeTradeRequest = serde_json::from_str(json).unwrap();
        assert!(req.parse_ids().is_err());
    }
}

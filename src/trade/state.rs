//! Trade status machine
//!
//! ```text
//!            executor accept    ┌──────────┐
//!        ┌─────────────────────▶│ Executed │
//!        │                      └──────────┘
//!   ┌────┴─┐ executor decline   ┌──────────┐
//!   │ Open ├───────────────────▶│   Void   │◀── conflicting execution
//!   └────┬─┘                    └──────────┘
//!        │ initiator decline    ┌───────────┐
//!        └─────────────────────▶│ Cancelled │
//!                               └───────────┘
//! ```

use super::{FinalizeAction, Trade, TradeStatus};
use crate::types::{LedgerError, Result};

/// Caller's side of a trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeRole {
    Initiator,
    Executor,
}

/// Outcome of a valid finalize call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Executor accepted: run the execution protocol
    Execute,
    /// Executor rejected the proposal
    Decline,
    /// Initiator withdrew the proposal
    Cancel,
}

impl Transition {
    pub fn target(self) -> TradeStatus {
        match self {
            Transition::Execute => TradeStatus::Executed,
            Transition::Decline => TradeStatus::Void,
            Transition::Cancel => TradeStatus::Cancelled,
        }
    }
}

/// Decide what a finalize call does. Pure; nothing is mutated here.
pub fn decide(trade: &Trade, requester_email: &str, action: FinalizeAction) -> Result<Transition> {
    if trade.status.is_terminal() {
        return Err(LedgerError::validation("trade is void or cancelled"));
    }

    match (trade.role_of(requester_email), action) {
        (Some(TradeRole::Executor), FinalizeAction::Accept) => Ok(Transition::Execute),
        (Some(TradeRole::Executor), FinalizeAction::Decline) => Ok(Transition::Decline),
        (Some(TradeRole::Initiator), FinalizeAction::Accept) => Err(LedgerError::validation(
            "initiator cannot perform this action",
        )),
        (Some(TradeRole::Initiator), FinalizeAction::Decline) => Ok(Transition::Cancel),
        (None, _) => Err(LedgerError::unauthorized("requestor not involved in trade")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::UnitId;
    use crate::trade::fixtures::open_trade;
    use crate::types::ErrorCategory;

    const INITIATOR: &str = "alice@example.com";
    const EXECUTOR: &str = "bob@example.com";
    const OUTSIDER: &str = "mallory@example.com";

    fn trade(status: TradeStatus) -> Trade {
        let (u1, u2) = (UnitId::new_v4(), UnitId::new_v4());
        let mut t = open_trade(INITIATOR, &[&u1], EXECUTOR, &[&u2]);
        t.status = status;
        t
    }

    #[test]
    fn test_open_transitions_are_total() {
        let open = trade(TradeStatus::Open);
        let cases = [
            (EXECUTOR, FinalizeAction::Accept, Ok(TradeStatus::Executed)),
            (EXECUTOR, FinalizeAction::Decline, Ok(TradeStatus::Void)),
            (INITIATOR, FinalizeAction::Accept, Err(ErrorCategory::Validation)),
            (INITIATOR, FinalizeAction::Decline, Ok(TradeStatus::Cancelled)),
            (OUTSIDER, FinalizeAction::Accept, Err(ErrorCategory::Unauthorized)),
            (OUTSIDER, FinalizeAction::Decline, Err(ErrorCategory::Unauthorized)),
        ];

        for (who, action, expected) in cases {
            let got = decide(&open, who, action)
                .map(Transition::target)
                .map_err(|e| e.category());
            assert_eq!(got, expected, "{} {}", who, action);
        }
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for status in [
            TradeStatus::Executed,
            TradeStatus::Void,
            TradeStatus::Cancelled,
        ] {
            let t = trade(status);
            for who in [INITIATOR, EXECUTOR, OUTSIDER] {
                for action in [FinalizeAction::Accept, FinalizeAction::Decline] {
                    let err = decide(&t, who, action).unwrap_err();
                    assert_eq!(err.category(), ErrorCategory::Validation);
                    assert!(err.to_string().contains("void or cancelled"));
                }
            }
        }
    }
}

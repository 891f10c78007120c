//! Timeshare ledger
//!
//! Ownership and trading for a group's shared calendar. A generated
//! schedule (seasons → blocks → units) is committed as the group's master
//! schedule together with a flat ownership index. Members then propose
//! bilateral trades of units; accepting a trade swaps ownership and voids
//! every other open trade that shares a unit, in one atomic write.
//!
//! ## Modules
//!
//! - `schedule`: schedule shapes, the ownership index, the master schedule
//! - `trade`: requests, creation rules, the status machine, execution plans
//! - `engine`: the entry point that loads, validates and commits
//! - `store`: the storage seam and an in-memory implementation
//! - `db`: MongoDB documents and the production store
//! - `auth`: caller identity from bearer tokens, group roles
//! - `notify`: post-commit trade notifications

pub mod auth;
pub mod config;
pub mod db;
pub mod engine;
pub mod notify;
pub mod schedule;
pub mod store;
pub mod trade;
pub mod types;

pub use auth::{IdentityVerifier, RequestIdentity};
pub use config::Args;
pub use engine::{ConcurrencyMode, EngineConfig, GroupTrades, TradeEngine};
pub use schedule::{build_ownership_index, MasterSchedule, OwnershipIndex, Schedule, UnitId};
pub use store::{MemoryScheduleStore, ScheduleStore, WriteOutcome};
pub use trade::{FinalizeAction, FinalizeTradeRequest, Trade, TradeRequest, TradeStatus};
pub use types::{ErrorCategory, LedgerError, Result};

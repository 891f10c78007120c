//! Configuration
//!
//! CLI arguments and environment variable handling using clap. A `.env`
//! file is loaded first, so every setting can live there too.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::auth::IdentityVerifier;
use crate::engine::{ConcurrencyMode, EngineConfig};
use crate::trade::UnknownUnitPolicy;
use crate::types::Result;

/// Shared settings for every subcommand
#[derive(Parser, Debug, Clone)]
pub struct Args {
    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "timeshare")]
    pub mongodb_db: String,

    /// Upper bound on every store call, in milliseconds
    #[arg(long, env = "STORE_TIMEOUT_MS", default_value = "5000")]
    pub store_timeout_ms: u64,

    /// Upper bound on waiting for a schedule lock, in milliseconds
    #[arg(long, env = "LOCK_TIMEOUT_MS", default_value = "10000")]
    pub lock_timeout_ms: u64,

    /// Serialization strategy for writes to one schedule (lock, optimistic)
    #[arg(long, env = "CONCURRENCY_MODE", default_value = "lock")]
    pub concurrency_mode: ConcurrencyMode,

    /// Reloads allowed after a stale write
    #[arg(long, env = "MAX_COMMIT_RETRIES", default_value = "5")]
    pub max_commit_retries: u32,

    /// Unit ids missing from the ownership index (reject, pass-through)
    #[arg(long, env = "UNKNOWN_UNITS", default_value = "reject")]
    pub unknown_units: UnknownUnitPolicy,

    /// JWT secret for verifying caller tokens (required outside dev mode)
    #[arg(long, env = "JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Enable development mode (fixed token secret)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,

    /// Append trade notifications to this JSONL file
    #[arg(long, env = "AUDIT_LOG")]
    pub audit_log: Option<PathBuf>,

    /// Capacity of the notification queue
    #[arg(long, env = "NOTIFICATION_QUEUE", default_value = "256")]
    pub notification_queue: usize,
}

impl Args {
    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.dev_mode && self.jwt_secret.is_none() {
            return Err("JWT_SECRET is required outside dev mode".to_string());
        }
        if self.store_timeout_ms == 0 {
            return Err("STORE_TIMEOUT_MS must be greater than zero".to_string());
        }
        if self.lock_timeout_ms == 0 {
            return Err("LOCK_TIMEOUT_MS must be greater than zero".to_string());
        }
        if self.notification_queue == 0 {
            return Err("NOTIFICATION_QUEUE must be greater than zero".to_string());
        }
        Ok(())
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            store_timeout: Duration::from_millis(self.store_timeout_ms),
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            concurrency: self.concurrency_mode,
            max_commit_retries: self.max_commit_retries,
            unknown_units: self.unknown_units,
        }
    }

    /// Token verifier for this mode. A configured secret wins even in dev mode.
    pub fn identity_verifier(&self) -> Result<IdentityVerifier> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(secret), _) => IdentityVerifier::new(secret.clone()),
            (None, true) => Ok(IdentityVerifier::new_dev()),
            (None, false) => IdentityVerifier::new(""),
        }
    }
}

//! Shared types

mod error;

pub use error::{ErrorCategory, LedgerError, Result};

use bson::oid::ObjectId;

/// Parse a hex object id supplied by a caller, naming the field on failure.
pub fn parse_object_id(raw: &str, field: &str) -> Result<ObjectId> {
    if raw.trim().is_empty() {
        return Err(LedgerError::validation(format!("missing {}", field)));
    }
    ObjectId::parse_str(raw.trim())
        .map_err(|_| LedgerError::validation(format!("{} is not a valid id: {}", field, raw)))
}

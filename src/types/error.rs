//! Error types for the ledger
//!
//! One flat taxonomy with a category mapping for whatever request layer
//! sits in front of the engine.

use std::fmt;

/// Main error type for ledger operations
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    /// Internal invariant broken (duplicate unit ids, corrupt index positions).
    #[error("Consistency error: {0}")]
    Consistency(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Response category an error belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Unauthorized,
    Conflict,
    Server,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Validation => write!(f, "VALIDATION"),
            ErrorCategory::NotFound => write!(f, "NOT_FOUND"),
            ErrorCategory::Unauthorized => write!(f, "UNAUTHORIZED"),
            ErrorCategory::Conflict => write!(f, "CONFLICT"),
            ErrorCategory::Server => write!(f, "SERVER"),
        }
    }
}

impl LedgerError {
    /// Map the error onto its response category
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Unauthorized(_) => ErrorCategory::Unauthorized,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::Database(_) | Self::Timeout(_) | Self::Consistency(_) | Self::Config(_) => {
                ErrorCategory::Server
            }
        }
    }

    /// Whether the caller can fix this by changing the request
    pub fn is_client_error(&self) -> bool {
        self.category() != ErrorCategory::Server
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        Self::Database(format!("I/O error: {}", err))
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Validation(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for LedgerError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<bson::ser::Error> for LedgerError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Database(format!("BSON encode failed: {}", err))
    }
}

impl From<bson::de::Error> for LedgerError {
    fn from(err: bson::de::Error) -> Self {
        Self::Database(format!("BSON decode failed: {}", err))
    }
}

impl From<bson::oid::Error> for LedgerError {
    fn from(err: bson::oid::Error) -> Self {
        Self::Validation(format!("invalid object id: {}", err))
    }
}

impl From<jsonwebtoken::errors::Error> for LedgerError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        Self::Unauthorized(format!("JWT error: {}", err))
    }
}

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_category() {
        assert_eq!(
            LedgerError::Timeout("find".into()).category(),
            ErrorCategory::Server
        );
        assert_eq!(
            LedgerError::Consistency("bad position".into()).category(),
            ErrorCategory::Server
        );
        assert!(!LedgerError::Database("down".into()).is_client_error());
    }

    #[test]
    fn test_client_categories() {
        assert_eq!(
            LedgerError::validation("x").category(),
            ErrorCategory::Validation
        );
        assert_eq!(LedgerError::not_found("x").category(), ErrorCategory::NotFound);
        assert_eq!(
            LedgerError::unauthorized("x").category(),
            ErrorCategory::Unauthorized
        );
        assert!(LedgerError::Conflict("dup".into()).is_client_error());
    }

    #[test]
    fn test_display_prefix() {
        let err = LedgerError::validation("trade is void or cancelled");
        assert_eq!(err.to_string(), "Validation error: trade is void or cancelled");
    }
}

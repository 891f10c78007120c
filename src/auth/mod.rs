//! Caller identity and group roles
//!
//! Provides:
//! - JWT verification that yields the requesting user id
//! - Group roles for operations restricted to admins

pub mod identity;
pub mod permissions;

pub use identity::{extract_token_from_header, Claims, IdentityVerifier, RequestIdentity};
pub use permissions::GroupRole;

//! Database schemas
//!
//! MongoDB document structures for users, groups and master schedules.

mod group;
mod metadata;
mod schedule;
mod user;

pub use group::{GroupDoc, GROUP_COLLECTION};
pub use metadata::Metadata;
pub use schedule::SCHEDULE_COLLECTION;
pub use user::{UserDoc, USER_COLLECTION};

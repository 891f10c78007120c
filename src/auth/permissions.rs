//! Group roles
//!
//! Trading needs membership; committing a master schedule needs admin.

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::db::schemas::GroupDoc;

/// Role a user holds inside one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GroupRole {
    Member = 1,
    Admin = 2,
}

impl fmt::Display for GroupRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupRole::Member => write!(f, "MEMBER"),
            GroupRole::Admin => write!(f, "ADMIN"),
        }
    }
}

impl GroupDoc {
    /// `None` for outsiders
    pub fn role_of(&self, user_id: &ObjectId) -> Option<GroupRole> {
        if self.has_admin(user_id) {
            Some(GroupRole::Admin)
        } else if self.has_member(user_id) {
            Some(GroupRole::Member)
        } else {
            None
        }
    }

    /// Whether `user_id` holds at least `required`
    pub fn allows(&self, user_id: &ObjectId, required: GroupRole) -> bool {
        self.role_of(user_id).is_some_and(|role| role >= required)
    }
}

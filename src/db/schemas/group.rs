//! Group document schema

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for groups
pub const GROUP_COLLECTION: &str = "groups";

/// A group sharing one master schedule
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct GroupDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub name: String,

    /// May commit schedules and issue invitations
    #[serde(default)]
    pub admins: Vec<ObjectId>,

    /// Everyone who may trade, admins included
    #[serde(default)]
    pub members: Vec<ObjectId>,
}

impl GroupDoc {
    /// New group whose admins start out as its only members
    pub fn new(name: impl Into<String>, admins: Vec<ObjectId>) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            name: name.into(),
            members: admins.clone(),
            admins,
        }
    }

    pub fn with_members(mut self, members: impl IntoIterator<Item = ObjectId>) -> Self {
        for member in members {
            if !self.members.contains(&member) {
                self.members.push(member);
            }
        }
        self
    }

    pub fn has_admin(&self, user_id: &ObjectId) -> bool {
        self.admins.contains(user_id)
    }

    /// Admins count as members even if the member list lags behind
    pub fn has_member(&self, user_id: &ObjectId) -> bool {
        self.members.contains(user_id) || self.has_admin(user_id)
    }
}

impl IntoIndexes for GroupDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "name": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("name_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "members": 1 },
                Some(
                    IndexOptions::builder()
                        .name("members_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for GroupDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admins_are_members() {
        let admin = ObjectId::new();
        let member = ObjectId::new();
        let outsider = ObjectId::new();
        let group = GroupDoc::new("lake house", vec![admin]).with_members([member, admin]);

        assert!(group.has_admin(&admin));
        assert!(!group.has_admin(&member));
        assert!(group.has_member(&admin));
        assert!(group.has_member(&member));
        assert!(!group.has_member(&outsider));
        assert_eq!(group.members.len(), 2);
    }

    #[test]
    fn test_admin_missing_from_member_list() {
        let admin = ObjectId::new();
        let mut group = GroupDoc::new("cabin", vec![admin]);
        group.members.clear();
        assert!(group.has_member(&admin));
    }
}

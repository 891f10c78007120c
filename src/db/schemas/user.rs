//! User document schema
//!
//! Only the fields the ledger reads. Credentials and activation flows live
//! with the account service.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Login email; also the owner name recorded on schedule units
    pub email: String,

    #[serde(default)]
    pub first_name: String,

    #[serde(default)]
    pub last_name: String,

    /// Groups this user belongs to
    #[serde(default)]
    pub groups: Vec<ObjectId>,
}

impl UserDoc {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            groups: Vec::new(),
        }
    }

    pub fn with_groups(mut self, groups: Vec<ObjectId>) -> Self {
        self.groups = groups;
        self
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "email": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("email_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for UserDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

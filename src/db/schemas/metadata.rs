//! Bookkeeping fields shared by every stored document

use bson::DateTime;
use serde::{Deserialize, Serialize};

/// Common metadata for all documents
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    /// Soft-deletion flag. Master schedules are never deleted.
    #[serde(default)]
    pub is_deleted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    pub fn new() -> Self {
        let now = DateTime::now();
        Self {
            is_deleted: false,
            updated_at: Some(now),
            created_at: Some(now),
        }
    }

    /// Record a write
    pub fn touch(&mut self) {
        self.updated_at = Some(DateTime::now());
    }
}

//! Master schedule collection
//!
//! The document itself is [`MasterSchedule`]; this file holds its
//! collection name and index definitions.

use bson::{doc, Document};
use mongodb::options::IndexOptions;

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::schedule::MasterSchedule;

/// Collection name for master schedules
pub const SCHEDULE_COLLECTION: &str = "schedules";

impl IntoIndexes for MasterSchedule {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Active schedule lookup: newest per group
            (
                doc! { "group_id": 1, "created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("group_recency_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "trade_ledger._id": 1 },
                Some(
                    IndexOptions::builder()
                        .name("trade_id_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for MasterSchedule {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

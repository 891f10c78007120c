//! MongoDB persistence
//!
//! - `mongo`: client and typed collection wrapper
//! - `schemas`: stored document shapes and their indexes
//! - `store`: the production [`crate::store::ScheduleStore`]

pub mod mongo;
pub mod schemas;
pub mod store;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection, MutMetadata};
pub use store::MongoScheduleStore;

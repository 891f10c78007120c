//! MongoDB client and collection wrapper

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::{
    options::{IndexOptions, UpdateModifications},
    results::UpdateResult,
    Client, ClientSession, Collection, IndexModel,
};
use serde::{de::DeserializeOwned, Serialize};
use tracing::info;

use crate::db::schemas::Metadata;
use crate::types::{LedgerError, Result};

/// Trait for schemas that provide index definitions
pub trait IntoIndexes {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)>;
}

/// Trait for schemas with mutable metadata
pub trait MutMetadata {
    fn mut_metadata(&mut self) -> &mut Metadata;
}

/// MongoDB client wrapper
#[derive(Clone)]
pub struct MongoClient {
    client: Client,
    db_name: String,
}

impl MongoClient {
    /// Connect and ping. `timeout_ms` bounds server selection and connect.
    pub async fn new(uri: &str, db_name: &str, timeout_ms: u64) -> Result<Self> {
        info!("Connecting to MongoDB at {}", uri);

        let timeout_uri = if uri.contains('?') {
            format!(
                "{}&serverSelectionTimeoutMS={}&connectTimeoutMS={}",
                uri, timeout_ms, timeout_ms
            )
        } else {
            format!(
                "{}?serverSelectionTimeoutMS={}&connectTimeoutMS={}",
                uri, timeout_ms, timeout_ms
            )
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| LedgerError::Database(format!("Failed to connect to MongoDB: {}", e)))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| LedgerError::Database(format!("MongoDB ping failed: {}", e)))?;

        info!("Connected to MongoDB database '{}'", db_name);

        Ok(Self {
            client,
            db_name: db_name.to_string(),
        })
    }

    /// Get a typed collection with its indexes applied
    pub async fn collection<T>(&self, name: &str) -> Result<MongoCollection<T>>
    where
        T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
    {
        MongoCollection::new(&self.client, &self.db_name, name).await
    }

    /// Open a session for multi-statement transactions
    pub async fn start_session(&self) -> Result<ClientSession> {
        self.client
            .start_session()
            .await
            .map_err(|e| LedgerError::Database(format!("Failed to start session: {}", e)))
    }
}

/// Typed MongoDB collection with automatic indexing
#[derive(Debug, Clone)]
pub struct MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync,
{
    inner: Collection<T>,
}

impl<T> MongoCollection<T>
where
    T: Serialize + DeserializeOwned + Unpin + Send + Sync + IntoIndexes + MutMetadata,
{
    /// Create a new collection and apply indexes
    pub async fn new(client: &Client, db_name: &str, collection_name: &str) -> Result<Self> {
        let collection = client.database(db_name).collection::<T>(collection_name);
        let mongo_collection = MongoCollection { inner: collection };

        mongo_collection.apply_indexes().await?;

        Ok(mongo_collection)
    }

    async fn apply_indexes(&self) -> Result<()> {
        let schema_indices = T::into_indices();

        if schema_indices.is_empty() {
            return Ok(());
        }

        let indices: Vec<IndexModel> = schema_indices
            .into_iter()
            .map(|(keys, opts)| IndexModel::builder().keys(keys).options(opts).build())
            .collect();

        self.inner
            .create_indexes(indices)
            .await
            .map_err(|e| LedgerError::Database(format!("Failed to create indexes: {}", e)))?;

        Ok(())
    }

    /// Insert a document, setting metadata timestamps
    pub async fn insert_one(&self, mut item: T) -> Result<ObjectId> {
        let metadata = item.mut_metadata();
        metadata.is_deleted = false;
        metadata.created_at = Some(DateTime::now());
        metadata.updated_at = Some(DateTime::now());

        let result = self
            .inner
            .insert_one(item)
            .await
            .map_err(|e| LedgerError::Database(format!("Insert failed: {}", e)))?;

        result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| LedgerError::Database("Failed to get inserted ID".into()))
    }

    /// Find one live document by filter
    pub async fn find_one(&self, filter: Document) -> Result<Option<T>> {
        self.inner
            .find_one(live(filter))
            .await
            .map_err(|e| LedgerError::Database(format!("Find failed: {}", e)))
    }

    /// Find the first live document under `sort`
    pub async fn find_first(&self, filter: Document, sort: Document) -> Result<Option<T>> {
        self.inner
            .find_one(live(filter))
            .sort(sort)
            .await
            .map_err(|e| LedgerError::Database(format!("Find failed: {}", e)))
    }

    /// Update one document
    pub async fn update_one(
        &self,
        filter: Document,
        update: impl Into<UpdateModifications>,
    ) -> Result<UpdateResult> {
        self.inner
            .update_one(filter, update.into())
            .await
            .map_err(|e| LedgerError::Database(format!("Update failed: {}", e)))
    }

    /// Update one document inside a transaction, with optional array filters.
    /// A transient write conflict comes back as `Conflict`.
    pub async fn update_one_in(
        &self,
        session: &mut ClientSession,
        filter: Document,
        update: Document,
        array_filters: Option<Vec<Document>>,
    ) -> Result<UpdateResult> {
        let action = self.inner.update_one(filter, update).session(&mut *session);
        let action = match array_filters {
            Some(filters) => action.array_filters(filters),
            None => action,
        };
        action.await.map_err(|e| {
            if e.contains_label(mongodb::error::TRANSIENT_TRANSACTION_ERROR) {
                LedgerError::Conflict(format!("transaction write conflict: {}", e))
            } else {
                LedgerError::Database(format!("Update failed: {}", e))
            }
        })
    }
}

/// Exclude soft-deleted documents
fn live(mut filter: Document) -> Document {
    filter.insert("metadata.is_deleted", doc! { "$ne": true });
    filter
}

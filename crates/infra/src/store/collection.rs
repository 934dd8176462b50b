//! Driver-facing contract for a conventional document database.
//!
//! Filters and updates are JSON documents in the usual operator style
//! (`{"status": {"$in": [..]}}`, `{"$set": {..}}`). Implementations must make
//! `update_one` and `find_one_and_update` atomic per document; that is the
//! only synchronization the job queue relies on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::error::StoreError;

/// A stored document (or a filter/update document).
pub type Document = Map<String, Value>;

/// Result of `insert_many`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertManyOutcome {
    /// Ids assigned to the inserted documents, in input order.
    pub inserted_ids: Vec<Value>,
}

/// Result of `update_one`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOutcome {
    pub matched_count: u64,
    pub modified_count: u64,
    /// Set only when an upsert inserted a new document.
    pub upserted_id: Option<Value>,
}

/// Reply of `find_one_and_update` when a document matched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModifyReply {
    pub value: Option<Document>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Conventional numeric form (`1` / `-1`) used in logs.
    pub fn as_i32(&self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }
}

/// Which snapshot `find_one_and_update` returns.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnDocument {
    #[default]
    Before,
    After,
}

/// Options for `find_one_and_update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOneAndUpdateOptions {
    /// Fields in precedence order.
    pub sort: Vec<(String, SortDirection)>,
    pub return_document: ReturnDocument,
}

impl FindOneAndUpdateOptions {
    pub fn sort_by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push((field.into(), direction));
        self
    }

    pub fn returning(mut self, which: ReturnDocument) -> Self {
        self.return_document = which;
        self
    }

    /// Render as `{sort: {field: ±1, ..}, returnDocument: ..}` for logging.
    pub fn to_value(&self) -> Value {
        let sort: Document = self
            .sort
            .iter()
            .map(|(field, dir)| (field.clone(), Value::from(dir.as_i32())))
            .collect();
        let which = match self.return_document {
            ReturnDocument::Before => "before",
            ReturnDocument::After => "after",
        };
        serde_json::json!({ "sort": sort, "returnDocument": which })
    }
}

/// A single collection in a document database.
#[async_trait::async_trait]
pub trait DocumentCollection: Send + Sync {
    /// Collection name, used in logs.
    fn name(&self) -> &str;

    async fn insert_many(&self, docs: Vec<Document>) -> Result<InsertManyOutcome, StoreError>;

    /// Update the first matching document; with `upsert`, insert one built
    /// from the filter's equality fields when nothing matches.
    async fn update_one(
        &self,
        filter: &Document,
        update: &Document,
        upsert: bool,
    ) -> Result<UpdateOutcome, StoreError>;

    async fn find_one(&self, filter: &Document) -> Result<Option<Document>, StoreError>;

    /// Atomically pick the first match under `options.sort`, apply `update`,
    /// and return the requested snapshot. `None` when nothing matched.
    async fn find_one_and_update(
        &self,
        filter: &Document,
        update: &Document,
        options: &FindOneAndUpdateOptions,
    ) -> Result<Option<ModifyReply>, StoreError>;
}

#[async_trait::async_trait]
impl<C> DocumentCollection for std::sync::Arc<C>
where
    C: DocumentCollection + ?Sized,
{
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn insert_many(&self, docs: Vec<Document>) -> Result<InsertManyOutcome, StoreError> {
        (**self).insert_many(docs).await
    }

    async fn update_one(
        &self,
        filter: &Document,
        update: &Document,
        upsert: bool,
    ) -> Result<UpdateOutcome, StoreError> {
        (**self).update_one(filter, update, upsert).await
    }

    async fn find_one(&self, filter: &Document) -> Result<Option<Document>, StoreError> {
        (**self).find_one(filter).await
    }

    async fn find_one_and_update(
        &self,
        filter: &Document,
        update: &Document,
        options: &FindOneAndUpdateOptions,
    ) -> Result<Option<ModifyReply>, StoreError> {
        (**self).find_one_and_update(filter, update, options).await
    }
}

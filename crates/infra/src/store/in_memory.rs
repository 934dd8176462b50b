//! In-memory document collection for tests/dev.

use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use serde_json::Value;
use tracing::trace;

use docsworker_core::JobId;

use super::collection::{
    Document, DocumentCollection, FindOneAndUpdateOptions, InsertManyOutcome, ModifyReply,
    ReturnDocument, SortDirection, UpdateOutcome,
};
use super::error::StoreError;
use super::query;

const ID_FIELD: &str = "_id";

/// In-process stand-in for a document database collection.
///
/// Every read-modify-write runs under one lock, which gives the same
/// per-document atomicity a real store offers (and more). An optional
/// latency is awaited *before* the lock is taken, so a caller whose deadline
/// fires first drops the call before anything is written.
#[derive(Debug)]
pub struct InMemoryCollection {
    name: String,
    docs: Mutex<Vec<Document>>,
    latency: RwLock<Duration>,
}

impl InMemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: Mutex::new(Vec::new()),
            latency: RwLock::new(Duration::ZERO),
        }
    }

    pub fn arc(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(name))
    }

    /// Delay every subsequent call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.write().unwrap_or_else(|e| e.into_inner()) = latency;
    }

    /// Snapshot of all stored documents, in insertion order.
    pub fn documents(&self) -> Vec<Document> {
        self.docs
            .lock()
            .map(|docs| docs.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.docs.lock().map(|docs| docs.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn simulate_latency(&self) {
        let latency = *self.latency.read().unwrap_or_else(|e| e.into_inner());
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<Document>>, StoreError> {
        self.docs
            .lock()
            .map_err(|_| StoreError::backend(format!("collection '{}' lock poisoned", self.name)))
    }

    fn first_match(docs: &[Document], filter: &Document) -> Result<Option<usize>, StoreError> {
        for (idx, doc) in docs.iter().enumerate() {
            if query::matches(doc, filter)? {
                return Ok(Some(idx));
            }
        }
        Ok(None)
    }

    fn ensure_id(doc: &mut Document) -> Value {
        doc.entry(ID_FIELD.to_string())
            .or_insert_with(|| JobId::generate().to_value())
            .clone()
    }

    fn contains_id(docs: &[Document], id: &Value) -> bool {
        docs.iter().any(|d| d.get(ID_FIELD) == Some(id))
    }

    /// Apply `update` to a copy of `doc`; returns the new version.
    fn updated(doc: &Document, update: &Document) -> Result<Document, StoreError> {
        let mut next = doc.clone();
        query::apply_update(&mut next, update, false)?;
        if next.get(ID_FIELD) != doc.get(ID_FIELD) {
            return Err(StoreError::backend("the _id field is immutable"));
        }
        Ok(next)
    }
}

#[async_trait::async_trait]
impl DocumentCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_many(&self, docs: Vec<Document>) -> Result<InsertManyOutcome, StoreError> {
        self.simulate_latency().await;
        let mut stored = self.lock()?;

        let mut staged = Vec::with_capacity(docs.len());
        let mut inserted_ids = Vec::with_capacity(docs.len());
        for mut doc in docs {
            let id = Self::ensure_id(&mut doc);
            if Self::contains_id(&stored, &id) || inserted_ids.contains(&id) {
                return Err(StoreError::backend(format!("duplicate key: _id {id}")));
            }
            inserted_ids.push(id);
            staged.push(doc);
        }

        stored.extend(staged);
        trace!(collection = %self.name, count = inserted_ids.len(), "inserted documents");
        Ok(InsertManyOutcome { inserted_ids })
    }

    async fn update_one(
        &self,
        filter: &Document,
        update: &Document,
        upsert: bool,
    ) -> Result<UpdateOutcome, StoreError> {
        self.simulate_latency().await;
        let mut docs = self.lock()?;

        if let Some(idx) = Self::first_match(&docs, filter)? {
            let next = Self::updated(&docs[idx], update)?;
            let modified = next != docs[idx];
            docs[idx] = next;
            return Ok(UpdateOutcome {
                matched_count: 1,
                modified_count: u64::from(modified),
                upserted_id: None,
            });
        }

        if !upsert {
            return Ok(UpdateOutcome::default());
        }

        let mut doc = query::seed_from_filter(filter)?;
        query::apply_update(&mut doc, update, true)?;
        let id = Self::ensure_id(&mut doc);
        if Self::contains_id(&docs, &id) {
            return Err(StoreError::backend(format!("duplicate key: _id {id}")));
        }
        docs.push(doc);

        Ok(UpdateOutcome {
            matched_count: 0,
            modified_count: 0,
            upserted_id: Some(id),
        })
    }

    async fn find_one(&self, filter: &Document) -> Result<Option<Document>, StoreError> {
        self.simulate_latency().await;
        let docs = self.lock()?;
        Ok(Self::first_match(&docs, filter)?.map(|idx| docs[idx].clone()))
    }

    async fn find_one_and_update(
        &self,
        filter: &Document,
        update: &Document,
        options: &FindOneAndUpdateOptions,
    ) -> Result<Option<ModifyReply>, StoreError> {
        self.simulate_latency().await;
        let mut docs = self.lock()?;

        let mut candidates = Vec::new();
        for (idx, doc) in docs.iter().enumerate() {
            if query::matches(doc, filter)? {
                candidates.push(idx);
            }
        }

        // Stable sort: ties keep insertion order.
        candidates.sort_by(|&a, &b| {
            options
                .sort
                .iter()
                .map(|(field, direction)| {
                    let ord = query::sort_compare(
                        query::get_path(&docs[a], field),
                        query::get_path(&docs[b], field),
                    );
                    match direction {
                        SortDirection::Ascending => ord,
                        SortDirection::Descending => ord.reverse(),
                    }
                })
                .find(|ord| ord.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let Some(&idx) = candidates.first() else {
            return Ok(None);
        };

        let before = docs[idx].clone();
        let after = Self::updated(&before, update)?;
        docs[idx] = after.clone();

        let value = match options.return_document {
            ReturnDocument::Before => before,
            ReturnDocument::After => after,
        };
        Ok(Some(ModifyReply { value: Some(value) }))
    }
}

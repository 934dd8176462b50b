//! Generic CRUD primitives over a document collection.
//!
//! Every primitive:
//! - reads the deadline from configuration at call time
//! - runs the driver call through [`run_bounded`]
//! - on failure logs `{component, operation, filter/update, error}` and
//!   re-raises; nothing is swallowed or retried here

use std::sync::Arc;

use serde_json::Value;
use tracing::error;

use crate::config::ConfigSource;

use super::bounded::run_bounded;
use super::collection::{Document, DocumentCollection, FindOneAndUpdateOptions, ModifyReply};
use super::error::StoreError;

fn render(doc: &Document) -> String {
    Value::Object(doc.clone()).to_string()
}

/// Bounded, logged access to one collection.
pub struct StoreAccess<C> {
    collection: C,
    config: Arc<dyn ConfigSource>,
    component: &'static str,
}

impl<C> std::fmt::Debug for StoreAccess<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreAccess")
            .field("component", &self.component)
            .finish_non_exhaustive()
    }
}

impl<C: DocumentCollection> StoreAccess<C> {
    /// `component` names the owning repository in logs.
    pub fn new(collection: C, config: Arc<dyn ConfigSource>, component: &'static str) -> Self {
        Self {
            collection,
            config,
            component,
        }
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    pub fn component(&self) -> &'static str {
        self.component
    }

    /// Insert documents; `None` if the store reports no ids.
    pub async fn insert_many(
        &self,
        docs: Vec<Document>,
        context: &str,
    ) -> Result<Option<Vec<Value>>, StoreError> {
        let rendered = Value::Array(docs.iter().cloned().map(Value::Object).collect()).to_string();
        let deadline = self.config.store_timeout();

        match run_bounded(deadline, context, self.collection.insert_many(docs)).await {
            Ok(outcome) if outcome.inserted_ids.is_empty() => Ok(None),
            Ok(outcome) => Ok(Some(outcome.inserted_ids)),
            Err(err) => {
                error!(
                    component = self.component,
                    operation = "insertMany",
                    documents = %rendered,
                    error = %err,
                    "failed to insert documents"
                );
                Err(err)
            }
        }
    }

    /// Update-or-insert. Returns the new id only when an insert happened;
    /// `None` means an existing document matched `filter`.
    pub async fn upsert(
        &self,
        filter: &Document,
        update: &Document,
        context: &str,
    ) -> Result<Option<Value>, StoreError> {
        let deadline = self.config.store_timeout();

        match run_bounded(deadline, context, self.collection.update_one(filter, update, true)).await {
            Ok(outcome) => Ok(outcome.upserted_id),
            Err(err) => {
                error!(
                    component = self.component,
                    operation = "upsert",
                    filter = %render(filter),
                    update = %render(update),
                    error = %err,
                    "failed to upsert document"
                );
                Err(err)
            }
        }
    }

    pub async fn find_one(
        &self,
        filter: &Document,
        context: &str,
    ) -> Result<Option<Document>, StoreError> {
        let deadline = self.config.store_timeout();

        run_bounded(deadline, context, self.collection.find_one(filter))
            .await
            .inspect_err(|err| {
                error!(
                    component = self.component,
                    operation = "findOne",
                    filter = %render(filter),
                    error = %err,
                    "failed to find document"
                );
            })
    }

    /// Update one document. Zero modified documents is a [`StoreError::Db`],
    /// never a silent no-op.
    pub async fn update_one(
        &self,
        filter: &Document,
        update: &Document,
        context: &str,
    ) -> Result<bool, StoreError> {
        let deadline = self.config.store_timeout();

        let result = run_bounded(deadline, context, self.collection.update_one(filter, update, false))
            .await
            .and_then(|outcome| {
                if outcome.modified_count < 1 {
                    Err(StoreError::db(format!(
                        "Failed to update job ({}) for {}",
                        render(filter),
                        render(update)
                    )))
                } else {
                    Ok(true)
                }
            });

        result.inspect_err(|err| {
            error!(
                component = self.component,
                operation = "updateOne",
                filter = %render(filter),
                update = %render(update),
                error = %err,
                "failed to update document"
            );
        })
    }

    /// Atomically pick, modify and return one document snapshot.
    pub async fn find_one_and_update(
        &self,
        filter: &Document,
        update: &Document,
        options: &FindOneAndUpdateOptions,
        context: &str,
    ) -> Result<Option<ModifyReply>, StoreError> {
        let deadline = self.config.store_timeout();

        run_bounded(
            deadline,
            context,
            self.collection.find_one_and_update(filter, update, options),
        )
        .await
        .inspect_err(|err| {
            error!(
                component = self.component,
                operation = "findOneAndUpdate",
                filter = %render(filter),
                update = %render(update),
                options = %options.to_value(),
                error = %err,
                "failed to find and update document"
            );
        })
    }
}

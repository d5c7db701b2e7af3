//! An embedded in-memory destination behind the session traits, with a
//! unique `_id` index per collection. The ingest tests run against it,
//! and it doubles as a dry-run target.

use std::collections::HashMap;
use std::sync::Arc;

use bson::oid::ObjectId;
use bson::{Bson, Document};
use parking_lot::Mutex;

use crate::errors::Result;
use crate::session::{
    BulkWriteOptions, BulkWriteResult, DUPLICATE_KEY, Namespace, Session, SessionFactory,
    WriteFailure, WriteModel, dotted_get,
};

#[derive(Default)]
struct Store {
    collections: Mutex<HashMap<String, Vec<Document>>>,
}

/// Shared in-memory store handing out sessions over the same data.
#[derive(Clone, Default)]
pub struct MemoryFactory {
    store: Arc<Store>,
}

impl MemoryFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a collection's documents, in insertion order.
    #[must_use]
    pub fn documents(&self, ns: &Namespace) -> Vec<Document> {
        self.store.collections.lock().get(&ns.to_string()).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn count(&self, ns: &Namespace) -> usize {
        self.documents(ns).len()
    }

    /// Seeds a collection directly, bypassing the ingest path.
    pub fn seed(&self, ns: &Namespace, docs: Vec<Document>) {
        self.store.collections.lock().insert(ns.to_string(), docs);
    }
}

impl SessionFactory for MemoryFactory {
    fn session(&self) -> Result<Box<dyn Session>> {
        Ok(Box::new(MemorySession { store: Arc::clone(&self.store) }))
    }
}

struct MemorySession {
    store: Arc<Store>,
}

impl Session for MemorySession {
    fn ping(&mut self) -> Result<()> {
        Ok(())
    }

    fn drop_collection(&mut self, ns: &Namespace) -> Result<()> {
        self.store.collections.lock().remove(&ns.to_string());
        Ok(())
    }

    fn bulk_write(
        &mut self,
        ns: &Namespace,
        models: &[WriteModel],
        options: &BulkWriteOptions,
    ) -> Result<BulkWriteResult> {
        let mut collections = self.store.collections.lock();
        let docs = collections.entry(ns.to_string()).or_default();
        let mut result = BulkWriteResult::default();
        for (index, model) in models.iter().enumerate() {
            let failure = match model {
                WriteModel::InsertOne { document } => {
                    insert_one(docs, ns, index, document.clone(), &mut result)
                }
                WriteModel::ReplaceOne { filter, replacement, upsert } => {
                    match docs.iter().position(|d| matches(d, filter)) {
                        Some(pos) => {
                            let mut replacement = replacement.clone();
                            if let Some(id) = docs[pos].get("_id")
                                && !replacement.contains_key("_id")
                            {
                                replacement.insert("_id", id.clone());
                            }
                            docs[pos] = replacement;
                            result.matched += 1;
                            result.modified += 1;
                            None
                        }
                        None if *upsert => {
                            upsert_one(docs, ns, index, replacement.clone(), &mut result)
                        }
                        None => None,
                    }
                }
                WriteModel::UpdateOne { filter, update, upsert } => {
                    let set = update.get_document("$set").ok().cloned().unwrap_or_default();
                    match docs.iter().position(|d| matches(d, filter)) {
                        Some(pos) => {
                            for (key, value) in set {
                                docs[pos].insert(key, value);
                            }
                            result.matched += 1;
                            result.modified += 1;
                            None
                        }
                        None if *upsert => {
                            let mut image = Document::new();
                            for (key, value) in filter {
                                if !key.contains('.') && *value != Bson::Null {
                                    image.insert(key, value.clone());
                                }
                            }
                            for (key, value) in set {
                                image.insert(key, value);
                            }
                            upsert_one(docs, ns, index, image, &mut result)
                        }
                        None => None,
                    }
                }
                WriteModel::DeleteOne { filter } => {
                    if let Some(pos) = docs.iter().position(|d| matches(d, filter)) {
                        docs.remove(pos);
                        result.deleted += 1;
                    }
                    None
                }
            };
            if let Some(failure) = failure {
                result.write_errors.push(failure);
                if options.ordered {
                    break;
                }
            }
        }
        Ok(result)
    }
}

fn upsert_one(
    docs: &mut Vec<Document>,
    ns: &Namespace,
    index: usize,
    image: Document,
    result: &mut BulkWriteResult,
) -> Option<WriteFailure> {
    match insert_one(docs, ns, index, image, result) {
        None => {
            result.inserted -= 1;
            result.upserted += 1;
            None
        }
        failure => failure,
    }
}

fn insert_one(
    docs: &mut Vec<Document>,
    ns: &Namespace,
    index: usize,
    mut document: Document,
    result: &mut BulkWriteResult,
) -> Option<WriteFailure> {
    if !document.contains_key("_id") {
        let mut with_id = Document::new();
        with_id.insert("_id", ObjectId::new());
        with_id.extend(document);
        document = with_id;
    }
    let id = document.get("_id").cloned().unwrap_or(Bson::Null);
    if docs.iter().any(|d| d.get("_id") == Some(&id)) {
        return Some(WriteFailure {
            index,
            code: DUPLICATE_KEY,
            message: format!("E11000 duplicate key error collection: {ns} dup key: {id}"),
        });
    }
    docs.push(document);
    result.inserted += 1;
    None
}

/// Equality match per filter clause; null matches a missing field.
fn matches(doc: &Document, filter: &Document) -> bool {
    filter.iter().all(|(path, expected)| match dotted_get(doc, path) {
        Some(actual) => actual == expected,
        None => *expected == Bson::Null,
    })
}

//! The destination seam: an already-established session factory and the
//! bulk-write primitive the ingest workers drive. The engine only ever
//! calls what is declared here, so any driver (or the in-memory store in
//! `memstore`) can sit behind it.

use bson::{Bson, Document};

use crate::errors::Result;

/// A fully-qualified collection name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Namespace {
    pub db: String,
    pub collection: String,
}

impl Namespace {
    #[must_use]
    pub fn new(db: impl Into<String>, collection: impl Into<String>) -> Self {
        Self { db: db.into(), collection: collection.into() }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}.{}", self.db, self.collection)
    }
}

/// One operation inside a bulk write.
#[derive(Debug, Clone)]
pub enum WriteModel {
    InsertOne { document: Document },
    ReplaceOne { filter: Document, replacement: Document, upsert: bool },
    UpdateOne { filter: Document, update: Document, upsert: bool },
    DeleteOne { filter: Document },
}

/// Options forwarded unchanged to the underlying bulk operation.
#[derive(Debug, Clone, Default)]
pub struct BulkWriteOptions {
    pub ordered: bool,
    pub bypass_document_validation: bool,
    pub write_concern: Option<String>,
}

/// A per-operation failure inside an otherwise-delivered bulk write.
#[derive(Debug, Clone)]
pub struct WriteFailure {
    /// Index of the failed operation within the bulk.
    pub index: usize,
    pub code: i32,
    pub message: String,
}

pub const DUPLICATE_KEY: i32 = 11000;
const DUPLICATE_KEY_UPDATE: i32 = 11001;
const DUPLICATE_KEY_CAPPED: i32 = 12582;
const DOCUMENT_VALIDATION_FAILURE: i32 = 121;

impl WriteFailure {
    /// Whether the default policy continues past this failure. Duplicate
    /// keys and document-validation rejections are recoverable; anything
    /// else aborts the ingest.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self.code,
            DUPLICATE_KEY | DUPLICATE_KEY_UPDATE | DUPLICATE_KEY_CAPPED
                | DOCUMENT_VALIDATION_FAILURE
        )
    }
}

impl std::fmt::Display for WriteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "write error at index {} (code {}): {}", self.index, self.code, self.message)
    }
}

/// Aggregated result of one bulk write.
#[derive(Debug, Clone, Default)]
pub struct BulkWriteResult {
    pub inserted: u64,
    pub matched: u64,
    pub modified: u64,
    pub upserted: u64,
    pub deleted: u64,
    pub write_errors: Vec<WriteFailure>,
}

/// One open session against the destination. Transport-level failures
/// surface as `Err` and are always fatal.
pub trait Session: Send {
    /// # Errors
    /// Fails when the destination is unreachable.
    fn ping(&mut self) -> Result<()>;

    /// # Errors
    /// Fails on transport loss; dropping a missing collection is not an
    /// error.
    fn drop_collection(&mut self, ns: &Namespace) -> Result<()>;

    /// Executes one bulk write. Per-operation failures are reported in
    /// the result; `Err` is reserved for infrastructure failures.
    ///
    /// # Errors
    /// Session loss, authentication failure, or request timeout.
    fn bulk_write(
        &mut self,
        ns: &Namespace,
        models: &[WriteModel],
        options: &BulkWriteOptions,
    ) -> Result<BulkWriteResult>;
}

/// Hands out sessions to ingest workers; shared read-only across the
/// worker pool, one session acquired per batch.
pub trait SessionFactory: Send + Sync {
    /// # Errors
    /// Fails when no session can be established.
    fn session(&self) -> Result<Box<dyn Session>>;
}

/// Resolves a dotted path through nested documents, as filter clauses
/// do; arrays are not traversed.
#[must_use]
pub fn dotted_get<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut current = doc;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let value = current.get(segment)?;
        if segments.peek().is_none() {
            return Some(value);
        }
        current = value.as_document()?;
    }
    None
}

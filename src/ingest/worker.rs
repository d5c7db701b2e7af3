use bson::oid::ObjectId;
use bson::{Bson, Document, doc};
use crossbeam_channel::{Receiver, Sender};

use crate::cancel::Cancellation;
use crate::errors::ImportError;
use crate::options::Mode;
use crate::session::{
    BulkWriteOptions, Namespace, SessionFactory, WriteModel, dotted_get,
};

use super::batch::Batch;
use super::progress::BatchOutcome;

/// How many recoverable write errors each batch logs before going quiet.
const ERROR_LOG_SAMPLE: usize = 5;

/// Per-run configuration shared by every ingest worker.
pub struct WriteConfig {
    pub ns: Namespace,
    pub mode: Mode,
    pub upsert_fields: Vec<String>,
    pub ignore_blanks: bool,
    pub stop_on_error: bool,
    pub bulk: BulkWriteOptions,
}

/// One ingest worker: pulls batches, translates them into write models
/// for the configured mode, and executes one bulk write per batch with a
/// session acquired from the factory.
pub fn run_worker(
    factory: &dyn SessionFactory,
    config: &WriteConfig,
    batches: &Receiver<Batch>,
    outcomes: &Sender<BatchOutcome>,
    cancel: &Cancellation,
) {
    for batch in batches {
        if cancel.is_cancelled() {
            return;
        }
        let outcome = execute_batch(factory, config, batch);
        let abort = outcome.error.is_some();
        if outcomes.send(outcome).is_err() || abort {
            return;
        }
    }
}

fn execute_batch(
    factory: &dyn SessionFactory,
    config: &WriteConfig,
    batch: Batch,
) -> BatchOutcome {
    let models = build_models(config, batch.docs);
    if models.is_empty() {
        return BatchOutcome::default();
    }
    let mut session = match factory.session() {
        Ok(session) => session,
        Err(error) => {
            return BatchOutcome { successes: 0, failures: 0, error: Some(error) };
        }
    };
    match session.bulk_write(&config.ns, &models, &config.bulk) {
        Ok(result) => {
            let failures = result.write_errors.len() as u64;
            let successes = match result.write_errors.first() {
                Some(first) if config.bulk.ordered => first.index as u64,
                _ => models.len() as u64 - failures,
            };
            let error = first_abort_error(config, &result.write_errors);
            if error.is_none() {
                for failure in result.write_errors.iter().take(ERROR_LOG_SAMPLE) {
                    log::warn!("continuing through {failure}");
                }
                if failures as usize > ERROR_LOG_SAMPLE {
                    let hidden = failures as usize - ERROR_LOG_SAMPLE;
                    log::warn!("...and {hidden} more write errors in this batch");
                }
            }
            BatchOutcome { successes, failures, error }
        }
        Err(error) => {
            // Transport-level failure: nothing in this batch was acknowledged.
            BatchOutcome { successes: 0, failures: 0, error: Some(error) }
        }
    }
}

fn first_abort_error(
    config: &WriteConfig,
    failures: &[crate::session::WriteFailure],
) -> Option<ImportError> {
    let first = failures.first()?;
    if config.stop_on_error || failures.iter().any(|f| !f.is_recoverable()) {
        let offender =
            failures.iter().find(|f| !f.is_recoverable()).unwrap_or(first);
        return Some(ImportError::Write(offender.to_string()));
    }
    None
}

fn build_models(config: &WriteConfig, docs: Vec<Document>) -> Vec<WriteModel> {
    let mut models = Vec::with_capacity(docs.len());
    for mut doc in docs {
        match config.mode {
            Mode::Insert => models.push(WriteModel::InsertOne { document: doc }),
            Mode::Upsert => {
                ensure_id(config, &mut doc);
                let Some(filter) = build_filter(config, &doc) else { continue };
                models.push(WriteModel::ReplaceOne { filter, replacement: doc, upsert: true });
            }
            Mode::Merge => {
                ensure_id(config, &mut doc);
                let Some(filter) = build_filter(config, &doc) else { continue };
                models.push(WriteModel::UpdateOne {
                    filter,
                    update: doc! { "$set": doc },
                    upsert: true,
                });
            }
            Mode::Delete => {
                let Some(filter) = build_filter(config, &doc) else { continue };
                models.push(WriteModel::DeleteOne { filter });
            }
        }
    }
    models
}

/// Upserts keyed on `_id` need a stable identifier in the replacement
/// image, so one is generated up front when the document lacks it.
fn ensure_id(config: &WriteConfig, doc: &mut Document) {
    if doc.contains_key("_id") || !config.upsert_fields.iter().any(|f| f == "_id") {
        return;
    }
    let mut with_id = Document::new();
    with_id.insert("_id", ObjectId::new());
    with_id.extend(std::mem::take(doc));
    *doc = with_id;
}

/// Equality filter over the upsert-field paths. A missing path becomes a
/// null clause, or is dropped under ignore-blanks; when every clause
/// drops, the document is skipped entirely (`None`).
fn build_filter(config: &WriteConfig, doc: &Document) -> Option<Document> {
    let mut filter = Document::new();
    for path in &config.upsert_fields {
        match dotted_get(doc, path) {
            Some(value) => {
                filter.insert(path.clone(), value.clone());
            }
            None if config.ignore_blanks => {}
            None => {
                filter.insert(path.clone(), Bson::Null);
            }
        }
    }
    if filter.is_empty() {
        log::debug!("skipping document with no usable upsert fields");
        return None;
    }
    Some(filter)
}

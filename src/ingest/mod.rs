//! The concurrent ingest engine.
//!
//! One reader task feeds a bounded raw-record channel; N decoding workers
//! turn raw records into typed documents; one batcher groups them into
//! bounded bulk batches; M ingest workers execute the batches against the
//! destination. Outcomes fan into a single aggregator which owns the
//! counters and the cancellation flag.

mod batch;
mod decode;
mod progress;
mod worker;

use std::fs::File;
use std::io::Read;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{bounded, unbounded};

use crate::cancel::Cancellation;
use crate::errors::Result;
use crate::extjson::Dialect;
use crate::fields::FieldSpec;
use crate::input::{DelimitedReader, InputReader, JsonReader};
use crate::options::{ImportOptions, InputFormat};
use crate::session::{BulkWriteOptions, Namespace, SessionFactory};

use batch::run_batcher;
use decode::{DecodeConfig, run_decoder};
use progress::{BatchOutcome, aggregate};
use worker::{WriteConfig, run_worker};

pub use batch::{Batch, MAX_BATCH_BYTES};
pub use progress::ImportResult;

const RAW_CHANNEL_CAP: usize = 10_000;
const DOC_CHANNEL_CAP: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IngestState {
    Setup,
    Streaming,
    Draining,
    Done,
    Aborted,
}

/// Orchestrates one import run: validates options, opens the byte
/// stream, wires the staged pipeline, and reports final counts.
pub struct Importer {
    options: ImportOptions,
    factory: Arc<dyn SessionFactory>,
}

impl Importer {
    /// Validates the options bundle; setup errors surface here and no
    /// ingest work starts.
    ///
    /// # Errors
    /// Everything `ImportOptions::validate` rejects.
    pub fn new(mut options: ImportOptions, factory: Arc<dyn SessionFactory>) -> Result<Self> {
        options.validate()?;
        Ok(Self { options, factory })
    }

    /// Runs the import to completion. Fatal errors and stop-on-error
    /// aborts are reported in the result alongside whatever counts were
    /// reached; setup errors yield zero counts.
    #[must_use]
    pub fn run(self) -> ImportResult {
        let mut state = IngestState::Setup;
        let result = match self.stream(&mut state) {
            Ok(result) => result,
            Err(error) => ImportResult { successes: 0, failures: 0, error: Some(error) },
        };
        let done = if result.error.is_some() { IngestState::Aborted } else { IngestState::Done };
        transition(&mut state, done);
        match &result.error {
            Some(error) => log::error!(
                "import aborted after {} imported, {} failed: {error}",
                result.successes,
                result.failures
            ),
            None => {
                log::info!("imported {} documents, {} failed", result.successes, result.failures);
            }
        }
        result
    }

    fn stream(&self, state: &mut IngestState) -> Result<ImportResult> {
        let ns = Namespace::new(self.options.db.clone(), self.options.collection_name());
        let mut session = self.factory.session()?;
        session.ping()?;
        if self.options.ingest.drop {
            log::info!("dropping collection {ns}");
            session.drop_collection(&ns)?;
        }
        drop(session);

        let source = self.open_source()?;
        let (reader, spec) = self.build_reader(source)?;
        if let Some(spec) = &spec
            && self.options.ingest.ignore_blanks
            && self.options.input.columns_have_types
        {
            spec.check_blank_compat()?;
        }

        let input = &self.options.input;
        let ingest = &self.options.ingest;
        let decode_config = DecodeConfig {
            spec,
            parse_grace: input.parse_grace,
            ignore_blanks: ingest.ignore_blanks,
            dialect: if input.legacy { Dialect::Legacy } else { Dialect::Canonical },
            use_array_index_fields: input.use_array_index_fields,
        };
        let write_config = WriteConfig {
            ns,
            mode: self.options.mode(),
            upsert_fields: self.options.upsert_field_list(),
            ignore_blanks: ingest.ignore_blanks,
            stop_on_error: ingest.stop_on_error,
            bulk: BulkWriteOptions {
                ordered: ingest.maintain_insertion_order,
                bypass_document_validation: ingest.bypass_document_validation,
                write_concern: ingest.write_concern.clone(),
            },
        };

        transition(state, IngestState::Streaming);
        let result = self.run_pipeline(reader, &decode_config, &write_config);
        transition(state, IngestState::Draining);
        Ok(result)
    }

    fn run_pipeline(
        &self,
        mut reader: Box<dyn InputReader>,
        decode_config: &DecodeConfig,
        write_config: &WriteConfig,
    ) -> ImportResult {
        let ingest = &self.options.ingest;
        let cancel = Cancellation::new();
        let (raw_tx, raw_rx) = bounded(RAW_CHANNEL_CAP);
        let (doc_tx, doc_rx) = bounded(DOC_CHANNEL_CAP);
        let (batch_tx, batch_rx) = bounded(ingest.num_insertion_workers * 2);
        let (outcome_tx, outcome_rx) = unbounded::<BatchOutcome>();

        log::debug!(
            "streaming with {} decoding workers, {} insertion workers, batches of {}",
            ingest.num_decoding_workers,
            ingest.num_insertion_workers,
            ingest.batch_size
        );
        thread::scope(|scope| {
            {
                let outcome_tx = outcome_tx.clone();
                let cancel = cancel.clone();
                scope.spawn(move || {
                    if let Err(error) = reader.stream(&raw_tx, &cancel) {
                        cancel.cancel();
                        let _ = outcome_tx.send(BatchOutcome {
                            successes: 0,
                            failures: 0,
                            error: Some(error),
                        });
                    }
                });
            }
            for _ in 0..ingest.num_decoding_workers {
                let raw_rx = raw_rx.clone();
                let doc_tx = doc_tx.clone();
                let outcome_tx = outcome_tx.clone();
                let cancel = cancel.clone();
                scope.spawn(move || {
                    run_decoder(decode_config, &raw_rx, &doc_tx, &outcome_tx, &cancel);
                });
            }
            drop(raw_rx);
            drop(doc_tx);
            {
                let cancel = cancel.clone();
                let batch_size = ingest.batch_size;
                scope.spawn(move || run_batcher(&doc_rx, &batch_tx, batch_size, &cancel));
            }
            for _ in 0..ingest.num_insertion_workers {
                let batch_rx = batch_rx.clone();
                let outcome_tx = outcome_tx.clone();
                let cancel = cancel.clone();
                let factory = &*self.factory;
                scope.spawn(move || {
                    run_worker(factory, write_config, &batch_rx, &outcome_tx, &cancel);
                });
            }
            drop(batch_rx);
            drop(outcome_tx);
            aggregate(&outcome_rx, &cancel)
        })
    }

    fn open_source(&self) -> Result<Box<dyn Read + Send>> {
        match &self.options.input.file {
            Some(path) => {
                log::info!("reading from {}", path.display());
                Ok(Box::new(File::open(path)?))
            }
            None => {
                log::info!("reading from stdin");
                Ok(Box::new(std::io::stdin()))
            }
        }
    }

    #[allow(clippy::type_complexity)]
    fn build_reader(
        &self,
        source: Box<dyn Read + Send>,
    ) -> Result<(Box<dyn InputReader>, Option<Arc<FieldSpec>>)> {
        let input = &self.options.input;
        match input.format {
            InputFormat::Json => {
                Ok((Box::new(JsonReader::new(source, input.json_array)), None))
            }
            format => {
                let preset = if let Some(fields) = &input.fields {
                    Some(FieldSpec::from_inline(
                        fields,
                        input.columns_have_types,
                        input.use_array_index_fields,
                    )?)
                } else if let Some(path) = &input.field_file {
                    Some(FieldSpec::from_field_file(
                        path,
                        input.columns_have_types,
                        input.use_array_index_fields,
                    )?)
                } else {
                    None
                };
                let reader = DelimitedReader::new(
                    source,
                    format,
                    input.header_line,
                    input.columns_have_types,
                    input.use_array_index_fields,
                    preset,
                )?;
                let spec = reader.spec();
                Ok((Box::new(reader), Some(spec)))
            }
        }
    }
}

fn transition(state: &mut IngestState, next: IngestState) {
    log::debug!("ingest state: {state:?} -> {next:?}");
    *state = next;
}

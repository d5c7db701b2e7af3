use std::sync::Arc;

use bson::{Bson, Document};
use crossbeam_channel::{Receiver, Sender};

use crate::cancel::Cancellation;
use crate::coerce;
use crate::errors::{ImportError, Result};
use crate::expand::DocumentBuilder;
use crate::extjson::{self, Dialect};
use crate::fields::{FieldColumn, FieldSpec};
use crate::input::RawRecord;
use crate::options::ParseGrace;

use super::progress::BatchOutcome;

/// Shared configuration for the decoding workers.
pub struct DecodeConfig {
    /// Positional columns for delimited records; `None` for JSON input.
    pub spec: Option<Arc<FieldSpec>>,
    pub parse_grace: ParseGrace,
    pub ignore_blanks: bool,
    pub dialect: Dialect,
    pub use_array_index_fields: bool,
}

enum Decoded {
    Document(Document),
    /// The row was dropped under skip-row grace; counted as one failure.
    RowFailed,
}

/// One decoding worker: pulls raw records, coerces and expands them into
/// documents, and pushes them downstream. Row failures are reported as
/// outcomes; structural errors abort the run.
pub fn run_decoder(
    config: &DecodeConfig,
    records: &Receiver<RawRecord>,
    docs: &Sender<Document>,
    outcomes: &Sender<BatchOutcome>,
    cancel: &Cancellation,
) {
    for record in records {
        if cancel.is_cancelled() {
            return;
        }
        let row = record.row();
        match decode_record(config, record) {
            Ok(Decoded::Document(doc)) => {
                if docs.send(doc).is_err() {
                    return;
                }
            }
            Ok(Decoded::RowFailed) => {
                log::debug!("dropped row {row} under skip-row grace");
                let _ =
                    outcomes.send(BatchOutcome { successes: 0, failures: 1, error: None });
            }
            Err(error) => {
                cancel.cancel();
                let _ = outcomes.send(BatchOutcome {
                    successes: 0,
                    failures: 0,
                    error: Some(error),
                });
                return;
            }
        }
    }
}

fn decode_record(config: &DecodeConfig, record: RawRecord) -> Result<Decoded> {
    match record {
        RawRecord::Json { value, .. } => {
            extjson::to_document(value, config.dialect).map(Decoded::Document)
        }
        RawRecord::Cells { row, cells } => decode_cells(config, row, &cells),
    }
}

fn decode_cells(config: &DecodeConfig, row: u64, cells: &[String]) -> Result<Decoded> {
    let Some(spec) = config.spec.as_deref() else {
        return Err(ImportError::Parse {
            row,
            message: "delimited record without a field list".to_string(),
        });
    };
    let mut builder = DocumentBuilder::new(config.use_array_index_fields);
    let mut synthetic;
    for (i, cell) in cells.iter().enumerate() {
        let column: &FieldColumn = match spec.columns.get(i) {
            Some(column) => column,
            None if spec.header_derived => {
                synthetic = FieldColumn::synthetic(i);
                &synthetic
            }
            None => {
                if config.parse_grace == ParseGrace::Stop {
                    return Err(ImportError::Parse {
                        row,
                        message: format!(
                            "row has {} cells but the field list has {}",
                            cells.len(),
                            spec.columns.len()
                        ),
                    });
                }
                return Ok(Decoded::RowFailed);
            }
        };
        if config.ignore_blanks && cell.is_empty() {
            continue;
        }
        let value = match coerce::coerce(cell, column) {
            Ok(value) => value,
            Err(error) => match config.parse_grace {
                ParseGrace::AutoCast => Bson::String(cell.clone()),
                ParseGrace::SkipField => continue,
                ParseGrace::SkipRow => return Ok(Decoded::RowFailed),
                ParseGrace::Stop => return Err(error),
            },
        };
        builder.insert(&column.name, &column.parts, value)?;
    }
    Ok(Decoded::Document(builder.finish()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn config(fields: &str, grace: ParseGrace, ignore_blanks: bool) -> DecodeConfig {
        let spec = FieldSpec::from_inline(fields, true, false).unwrap();
        DecodeConfig {
            spec: Some(Arc::new(spec)),
            parse_grace: grace,
            ignore_blanks,
            dialect: Dialect::Canonical,
            use_array_index_fields: false,
        }
    }

    fn cells(values: &[&str]) -> RawRecord {
        RawRecord::Cells { row: 1, cells: values.iter().map(|s| (*s).to_string()).collect() }
    }

    #[test]
    fn coerces_and_expands_cells() {
        let config = config("_id.int32(),a.b.string()", ParseGrace::Stop, false);
        let Decoded::Document(doc) = decode_record(&config, cells(&["7", "x"])).unwrap() else {
            panic!("expected a document");
        };
        assert_eq!(doc, doc! { "_id": 7, "a": { "b": "x" } });
    }

    #[test]
    fn auto_cast_keeps_the_raw_string() {
        let config = config("a.int32()", ParseGrace::AutoCast, false);
        let Decoded::Document(doc) = decode_record(&config, cells(&["oops"])).unwrap() else {
            panic!("expected a document");
        };
        assert_eq!(doc, doc! { "a": "oops" });
    }

    #[test]
    fn skip_field_omits_the_bad_cell() {
        let config = config("a.int32(),b.string()", ParseGrace::SkipField, false);
        let Decoded::Document(doc) = decode_record(&config, cells(&["oops", "x"])).unwrap()
        else {
            panic!("expected a document");
        };
        assert_eq!(doc, doc! { "b": "x" });
    }

    #[test]
    fn skip_row_drops_the_row() {
        let config = config("a.int32()", ParseGrace::SkipRow, false);
        assert!(matches!(
            decode_record(&config, cells(&["oops"])).unwrap(),
            Decoded::RowFailed
        ));
    }

    #[test]
    fn stop_grace_is_fatal() {
        let config = config("a.int32()", ParseGrace::Stop, false);
        assert!(decode_record(&config, cells(&["oops"])).is_err());
    }

    #[test]
    fn blank_cells_are_omitted_with_ignore_blanks() {
        let config = config("a.string(),b.string()", ParseGrace::Stop, true);
        let Decoded::Document(doc) = decode_record(&config, cells(&["", "x"])).unwrap() else {
            panic!("expected a document");
        };
        assert_eq!(doc, doc! { "b": "x" });
    }

    #[test]
    fn extra_cells_extend_header_derived_specs() {
        let spec = FieldSpec::from_names(&["a"], false, false, true).unwrap();
        let config = DecodeConfig {
            spec: Some(Arc::new(spec)),
            parse_grace: ParseGrace::Stop,
            ignore_blanks: false,
            dialect: Dialect::Canonical,
            use_array_index_fields: false,
        };
        let Decoded::Document(doc) = decode_record(&config, cells(&["1", "2", "3"])).unwrap()
        else {
            panic!("expected a document");
        };
        assert_eq!(doc, doc! { "a": 1, "field1": 2, "field2": 3 });
    }

    #[test]
    fn extra_cells_fail_fixed_specs_under_stop() {
        let config_stop = config("a.auto()", ParseGrace::Stop, false);
        assert!(decode_record(&config_stop, cells(&["1", "2"])).is_err());

        let config_skip = config("a.auto()", ParseGrace::SkipRow, false);
        assert!(matches!(
            decode_record(&config_skip, cells(&["1", "2"])).unwrap(),
            Decoded::RowFailed
        ));
    }

    #[test]
    fn json_records_convert_extended_json() {
        let config = DecodeConfig {
            spec: None,
            parse_grace: ParseGrace::Stop,
            ignore_blanks: false,
            dialect: Dialect::Canonical,
            use_array_index_fields: false,
        };
        let record = RawRecord::Json {
            row: 1,
            value: serde_json::json!({"_id": {"$numberLong": "9"}, "a": 1}),
        };
        let Decoded::Document(doc) = decode_record(&config, record).unwrap() else {
            panic!("expected a document");
        };
        assert_eq!(doc, doc! { "_id": Bson::Int64(9), "a": 1 });
    }
}

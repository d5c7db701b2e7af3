use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::{ImportError, Result};

/// Input file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Json,
    Csv,
    Tsv,
}

impl InputFormat {
    #[must_use]
    pub const fn delimiter(self) -> u8 {
        match self {
            Self::Tsv => b'\t',
            _ => b',',
        }
    }

    #[must_use]
    pub const fn is_delimited(self) -> bool {
        matches!(self, Self::Csv | Self::Tsv)
    }
}

impl FromStr for InputFormat {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            other => Err(ImportError::InvalidOption(format!("unknown input type: {other}"))),
        }
    }
}

/// Write mode for the ingest stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Insert,
    Upsert,
    Merge,
    Delete,
}

impl FromStr for Mode {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "insert" => Ok(Self::Insert),
            "upsert" => Ok(Self::Upsert),
            "merge" => Ok(Self::Merge),
            "delete" => Ok(Self::Delete),
            other => Err(ImportError::InvalidOption(format!("invalid mode: {other}"))),
        }
    }
}

/// Reaction to a single-cell coercion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParseGrace {
    AutoCast,
    SkipField,
    SkipRow,
    Stop,
}

impl FromStr for ParseGrace {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "autocast" => Ok(Self::AutoCast),
            "skipfield" => Ok(Self::SkipField),
            "skiprow" => Ok(Self::SkipRow),
            "stop" => Ok(Self::Stop),
            other => Err(ImportError::InvalidOption(format!("invalid parse grace: {other}"))),
        }
    }
}

/// Options for reading input data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputOptions {
    pub format: InputFormat,
    /// Path to the input file; `None` means stdin.
    pub file: Option<PathBuf>,
    /// Inline comma-separated field list.
    pub fields: Option<String>,
    /// File with one field name per line.
    pub field_file: Option<PathBuf>,
    /// Treat the input's first line as the field list (CSV and TSV only).
    pub header_line: bool,
    /// Field names carry `<name>.<type>(<arg>)` suffixes.
    pub columns_have_types: bool,
    /// Integer path segments denote array indexes.
    pub use_array_index_fields: bool,
    /// The input is a single top-level JSON array.
    pub json_array: bool,
    /// Parse JSON with the legacy extended-JSON dialect.
    pub legacy: bool,
    pub parse_grace: ParseGrace,
}

impl Default for InputOptions {
    fn default() -> Self {
        Self {
            format: InputFormat::Json,
            file: None,
            fields: None,
            field_file: None,
            header_line: false,
            columns_have_types: false,
            use_array_index_fields: false,
            json_array: false,
            legacy: false,
            parse_grace: ParseGrace::Stop,
        }
    }
}

/// Options for storing data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestOptions {
    /// Drop the destination collection before streaming.
    pub drop: bool,
    /// Omit fields with empty values (CSV and TSV only).
    pub ignore_blanks: bool,
    pub mode: Option<Mode>,
    /// Deprecated alias for `mode = upsert`.
    pub upsert: bool,
    /// Comma-separated filter paths for upsert/merge/delete.
    pub upsert_fields: Option<String>,
    /// Strict input order: forces one worker per stage and stop-on-error.
    pub maintain_insertion_order: bool,
    pub stop_on_error: bool,
    pub num_insertion_workers: usize,
    /// `0` selects the logical CPU count.
    pub num_decoding_workers: usize,
    pub batch_size: usize,
    pub bypass_document_validation: bool,
    /// Opaque write-concern specifier, passed through to the destination.
    pub write_concern: Option<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            drop: false,
            ignore_blanks: false,
            mode: None,
            upsert: false,
            upsert_fields: None,
            maintain_insertion_order: false,
            stop_on_error: false,
            num_insertion_workers: 1,
            num_decoding_workers: 0,
            batch_size: 1000,
            bypass_document_validation: false,
            write_concern: None,
        }
    }
}

/// The full, validated options bundle for one import run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImportOptions {
    pub db: String,
    pub collection: Option<String>,
    pub input: InputOptions,
    pub ingest: IngestOptions,
}

impl ImportOptions {
    /// Validates the bundle and resolves derived settings: the collection
    /// name, the effective mode, the upsert-field list, and worker counts.
    ///
    /// # Errors
    /// Returns `ImportError::InvalidOption` for every inconsistent
    /// combination; no ingest work starts when validation fails.
    pub fn validate(&mut self) -> Result<()> {
        if self.collection.as_deref().is_none_or(str::is_empty) {
            let Some(file) = &self.input.file else {
                return Err(ImportError::InvalidOption(
                    "no collection specified; pass one or import from a named file".to_string(),
                ));
            };
            let base = file
                .file_stem()
                .and_then(|s| s.to_str())
                .ok_or_else(|| {
                    ImportError::InvalidOption(format!(
                        "no collection specified and none could be derived from '{}'",
                        file.display()
                    ))
                })?;
            log::info!("no collection specified; using '{base}' from the input file name");
            self.collection = Some(base.to_string());
        }

        if self.input.format == InputFormat::Json {
            if self.input.header_line {
                return Err(ImportError::InvalidOption(
                    "header line is only supported for CSV and TSV input".to_string(),
                ));
            }
            if self.input.fields.is_some() || self.input.field_file.is_some() {
                return Err(ImportError::InvalidOption(
                    "a field list is only supported for CSV and TSV input".to_string(),
                ));
            }
            if self.input.columns_have_types {
                return Err(ImportError::InvalidOption(
                    "typed columns are only supported for CSV and TSV input".to_string(),
                ));
            }
            if self.ingest.ignore_blanks {
                return Err(ImportError::InvalidOption(
                    "ignoring blanks is only supported for CSV and TSV input".to_string(),
                ));
            }
        } else {
            if self.input.legacy {
                return Err(ImportError::InvalidOption(
                    "the legacy extended-JSON dialect only applies to JSON input".to_string(),
                ));
            }
            if self.input.json_array {
                return Err(ImportError::InvalidOption(
                    "array mode only applies to JSON input".to_string(),
                ));
            }
            if self.input.fields.is_some() && self.input.field_file.is_some() {
                return Err(ImportError::InvalidOption(
                    "an inline field list and a field file are mutually exclusive".to_string(),
                ));
            }
            if self.input.header_line
                && (self.input.fields.is_some() || self.input.field_file.is_some())
            {
                return Err(ImportError::InvalidOption(
                    "a header line and an explicit field list are mutually exclusive".to_string(),
                ));
            }
            if self.input.fields.is_none()
                && self.input.field_file.is_none()
                && !self.input.header_line
            {
                return Err(ImportError::InvalidOption(
                    "CSV and TSV input needs a field list: inline fields, a field file, or a header line"
                        .to_string(),
                ));
            }
        }

        if self.ingest.upsert {
            match self.ingest.mode {
                None => self.ingest.mode = Some(Mode::Upsert),
                Some(Mode::Upsert) => {}
                Some(_) => {
                    return Err(ImportError::InvalidOption(
                        "the deprecated upsert flag conflicts with the requested mode".to_string(),
                    ));
                }
            }
        }

        if self.ingest.upsert_fields.as_deref().is_some_and(|f| !f.is_empty()) {
            match self.ingest.mode {
                None => self.ingest.mode = Some(Mode::Upsert),
                Some(Mode::Insert) => {
                    return Err(ImportError::InvalidOption(
                        "upsert fields cannot be used with insert mode".to_string(),
                    ));
                }
                Some(_) => {}
            }
        }
        self.ingest.mode.get_or_insert(Mode::Insert);

        if self.mode() != Mode::Insert {
            for field in self.upsert_field_list() {
                if field.starts_with('$') || field.starts_with('.') {
                    return Err(ImportError::InvalidOption(format!(
                        "upsert field '{field}' cannot begin with '$' or '.'"
                    )));
                }
                if field.is_empty() {
                    return Err(ImportError::InvalidOption(
                        "upsert fields cannot be empty".to_string(),
                    ));
                }
            }
        }

        if self.ingest.maintain_insertion_order {
            self.ingest.stop_on_error = true;
            self.ingest.num_insertion_workers = 1;
            self.ingest.num_decoding_workers = 1;
        }
        if self.ingest.num_insertion_workers == 0 {
            self.ingest.num_insertion_workers = 1;
        }
        if self.ingest.num_decoding_workers == 0 {
            self.ingest.num_decoding_workers = num_cpus::get();
        }
        if self.ingest.batch_size == 0 {
            return Err(ImportError::InvalidOption("batch size must be positive".to_string()));
        }
        Ok(())
    }

    /// The effective write mode; `Insert` until `validate` resolves it.
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.ingest.mode.unwrap_or(Mode::Insert)
    }

    /// The filter paths for upsert/merge/delete; defaults to `_id`.
    #[must_use]
    pub fn upsert_field_list(&self) -> Vec<String> {
        match self.ingest.upsert_fields.as_deref() {
            Some(s) if !s.is_empty() => s.split(',').map(str::to_string).collect(),
            _ => vec!["_id".to_string()],
        }
    }

    /// The resolved destination collection name.
    #[must_use]
    pub fn collection_name(&self) -> &str {
        self.collection.as_deref().unwrap_or_default()
    }
}

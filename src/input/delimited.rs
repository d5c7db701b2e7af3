use std::io::{self, Read};
use std::sync::Arc;

use crossbeam_channel::Sender;
use csv::StringRecord;

use crate::cancel::Cancellation;
use crate::errors::Result;
use crate::fields::FieldSpec;
use crate::options::InputFormat;

use super::{InputReader, RawRecord};

/// Reader for CSV and TSV input with standard quoting rules.
pub struct DelimitedReader<R: Read + Send> {
    reader: csv::Reader<R>,
    spec: Arc<FieldSpec>,
}

impl<R: Read + Send> std::fmt::Debug for DelimitedReader<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelimitedReader").finish_non_exhaustive()
    }
}

impl<R: Read + Send> DelimitedReader<R> {
    /// Builds the reader, consuming the header line when `header_line` is
    /// set and deriving the field spec from it; otherwise `preset` (from
    /// inline fields or a field file) supplies the columns.
    ///
    /// # Errors
    /// An empty input with `header_line` surfaces the end-of-stream error
    /// verbatim; header parsing and validation errors are setup errors.
    pub fn new(
        source: R,
        format: InputFormat,
        header_line: bool,
        columns_have_types: bool,
        use_array_index_fields: bool,
        preset: Option<FieldSpec>,
    ) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(format.delimiter())
            .from_reader(source);
        let spec = if header_line {
            let mut record = StringRecord::new();
            if !reader.read_record(&mut record)? {
                return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
            }
            let names: Vec<&str> = record.iter().collect();
            FieldSpec::from_names(&names, columns_have_types, use_array_index_fields, true)?
        } else {
            let Some(spec) = preset else {
                return Err(io::Error::other("delimited input needs a field list").into());
            };
            spec
        };
        log::debug!("delimited reader ready with {} columns", spec.columns.len());
        Ok(Self { reader, spec: Arc::new(spec) })
    }

    /// The positional field spec rows are decoded against.
    #[must_use]
    pub fn spec(&self) -> Arc<FieldSpec> {
        Arc::clone(&self.spec)
    }
}

impl<R: Read + Send> InputReader for DelimitedReader<R> {
    fn stream(&mut self, out: &Sender<RawRecord>, cancel: &Cancellation) -> Result<()> {
        let mut record = StringRecord::new();
        let mut row: u64 = 0;
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if !self.reader.read_record(&mut record)? {
                return Ok(());
            }
            row += 1;
            let cells: Vec<String> = record.iter().map(str::to_string).collect();
            if out.send(RawRecord::Cells { row, cells }).is_err() {
                // Downstream hung up; shutdown is already in progress.
                return Ok(());
            }
        }
    }
}

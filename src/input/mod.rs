//! Input readers: delimited (CSV/TSV), JSON-per-line, and JSON-array.
//!
//! Each reader is a single-threaded producer pushing raw records into a
//! bounded channel; the decoder pool downstream turns them into typed
//! documents.

mod delimited;
mod json;

use crossbeam_channel::Sender;

use crate::cancel::Cancellation;
use crate::errors::Result;

pub use delimited::DelimitedReader;
pub use json::JsonReader;

/// One undecoded input record.
#[derive(Debug)]
pub enum RawRecord {
    /// A delimited row: positional cells, paired with the field spec later.
    Cells { row: u64, cells: Vec<String> },
    /// A parsed JSON value, pending extended-JSON conversion.
    Json { row: u64, value: serde_json::Value },
}

impl RawRecord {
    #[must_use]
    pub const fn row(&self) -> u64 {
        match self {
            Self::Cells { row, .. } | Self::Json { row, .. } => *row,
        }
    }
}

/// A streaming source of raw records.
pub trait InputReader: Send {
    /// Streams every record into `out`, returning when the source is
    /// exhausted, the run is cancelled, or an unrecoverable error occurs.
    ///
    /// # Errors
    /// Structural input errors are fatal and surface here.
    fn stream(&mut self, out: &Sender<RawRecord>, cancel: &Cancellation) -> Result<()>;
}

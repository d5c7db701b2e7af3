use std::io::{BufRead, BufReader, Read};

use crossbeam_channel::Sender;
use serde::de::{Deserializer as _, SeqAccess, Visitor};
use serde_json::Value;

use crate::cancel::Cancellation;
use crate::errors::{ImportError, Result};

use super::{InputReader, RawRecord};

/// Reader for JSON input: one top-level value per line, or the elements
/// of one top-level array in array mode.
pub struct JsonReader<R: Read + Send> {
    source: Option<BufReader<R>>,
    array: bool,
}

impl<R: Read + Send> JsonReader<R> {
    #[must_use]
    pub fn new(source: R, array: bool) -> Self {
        Self { source: Some(BufReader::new(source)), array }
    }
}

impl<R: Read + Send> InputReader for JsonReader<R> {
    fn stream(&mut self, out: &Sender<RawRecord>, cancel: &Cancellation) -> Result<()> {
        let Some(mut source) = self.source.take() else {
            return Ok(());
        };
        if self.array {
            if !next_byte_is(&mut source, b'[')? {
                return Err(ImportError::ExpectedArray);
            }
            let mut de = serde_json::Deserializer::from_reader(source);
            let sent = de.deserialize_seq(ElementSink { out, cancel })?;
            log::debug!("json array reader streamed {sent} elements");
            return Ok(());
        }
        let stream = serde_json::Deserializer::from_reader(source).into_iter::<Value>();
        let mut row: u64 = 0;
        for value in stream {
            if cancel.is_cancelled() {
                return Ok(());
            }
            let value = value?;
            if value.is_array() {
                return Err(ImportError::UnexpectedArray);
            }
            row += 1;
            if out.send(RawRecord::Json { row, value }).is_err() {
                return Ok(());
            }
        }
        Ok(())
    }
}

/// Skips insignificant whitespace and reports whether the next byte is
/// `expected`, leaving it unconsumed for the deserializer.
fn next_byte_is<R: Read>(source: &mut BufReader<R>, expected: u8) -> Result<bool> {
    loop {
        let buf = source.fill_buf()?;
        if buf.is_empty() {
            return Ok(false);
        }
        match buf.iter().position(|b| !b" \t\r\n".contains(b)) {
            Some(i) => {
                let found = buf[i] == expected;
                source.consume(i);
                return Ok(found);
            }
            None => {
                let len = buf.len();
                source.consume(len);
            }
        }
    }
}

struct ElementSink<'a> {
    out: &'a Sender<RawRecord>,
    cancel: &'a Cancellation,
}

impl<'de> Visitor<'de> for ElementSink<'_> {
    type Value = u64;

    fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "a top-level JSON array")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<u64, A::Error> {
        let mut row: u64 = 0;
        while let Some(value) = seq.next_element::<Value>()? {
            row += 1;
            if self.cancel.is_cancelled()
                || self.out.send(RawRecord::Json { row, value }).is_err()
            {
                break;
            }
        }
        Ok(row)
    }
}

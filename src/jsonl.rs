//! # JSONL Ingestion
//!
//! Reads newline-delimited JSON lazily. Each non-blank line becomes one
//! [`serde_json::Value`]; a line that does not parse yields
//! [`VisualizerError::Parse`] carrying its 1-based line number.

use std::io::BufRead;

use serde_json::Value;

use crate::error::{json_kind, Result, VisualizerError};
use crate::shape::{self, Record, Shape};

/// Iterator over the JSON values of a JSONL stream.
pub struct JsonlReader<R> {
    reader: R,
    line_number: usize,
    buf: String,
}

impl<R: BufRead> JsonlReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, line_number: 0, buf: String::new() }
    }
}

impl<R: BufRead> Iterator for JsonlReader<R> {
    type Item = Result<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_line(&mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) => {
                    return Some(Err(VisualizerError::Parse {
                        line: self.line_number + 1,
                        message: e.to_string(),
                    }))
                }
            }
            self.line_number += 1;

            let line = self.buf.trim();
            if line.is_empty() {
                continue;
            }
            return Some(serde_json::from_str(line).map_err(|e| VisualizerError::Parse {
                line: self.line_number,
                message: e.to_string(),
            }));
        }
    }
}

/// Parses a whole uploaded file and checks every line is an object.
///
/// Stops at the first malformed line. Non-object lines are reported as
/// [`VisualizerError::InvalidRecord`] with their 0-based record index.
pub fn read_records(bytes: &[u8]) -> Result<Vec<Record>> {
    let mut records = Vec::new();
    for (index, value) in JsonlReader::new(bytes).enumerate() {
        match value? {
            Value::Object(map) => records.push(map),
            other => {
                return Err(VisualizerError::InvalidRecord { index, found: json_kind(&other) })
            }
        }
    }
    Ok(records)
}

/// Collects at most `limit` values from the front of a JSONL stream.
pub fn read_sample<R: BufRead>(reader: R, limit: usize) -> Result<Vec<Value>> {
    JsonlReader::new(reader).take(limit).collect()
}

/// Detects a dataset's shape from its first `sample_size` records only.
pub fn detect_dataset_shape<R: BufRead>(reader: R, sample_size: usize) -> Result<Shape> {
    shape::detect_shape(&read_sample(reader, sample_size)?)
}

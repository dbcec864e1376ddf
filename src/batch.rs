//! # Batch Analysis
//!
//! Token statistics over the rows of an uploaded dataset, plus the per-segment
//! breakdown of a single row for detailed visualization.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, VisualizerError};
use crate::metrics::{MetricUnit, TextMetrics};
use crate::shape::{Record, Shape, MESSAGES_FIELD, PROMPT_FIELD, RESPONSE_FIELD, TEXT_FIELD};
use crate::tokenizer::{TokenizationResult, TokenizerBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RowSelection {
    #[default]
    All,
    FirstN { n: usize },
    Range { start: usize, end: usize },
}

impl RowSelection {
    /// Row indices selected out of `len` rows, clamped to the dataset.
    pub fn indices(&self, len: usize) -> std::ops::Range<usize> {
        match *self {
            RowSelection::All => 0..len,
            RowSelection::FirstN { n } => 0..n.min(len),
            RowSelection::Range { start, end } => {
                let end = end.min(len);
                start.min(end)..end
            }
        }
    }
}

/// A piece of a record that is tokenized on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    pub label: String,
    pub text: String,
}

/// Splits a record into the texts its shape says should be tokenized.
///
/// Records of unknown shape use `fallback_column` when it is present in the
/// record; otherwise they produce no segments.
pub fn record_segments(record: &Record, fallback_column: Option<&str>) -> Vec<Segment> {
    match Shape::of_record(record) {
        Shape::Chat => record
            .get(MESSAGES_FIELD)
            .and_then(Value::as_array)
            .map(|messages| {
                messages
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|msg| Segment {
                        label: capitalize(&value_text(&msg["role"])),
                        text: value_text(&msg["content"]),
                    })
                    .collect()
            })
            .unwrap_or_default(),
        Shape::Completion => vec![
            Segment { label: "Prompt".into(), text: value_text(&record[PROMPT_FIELD]) },
            Segment { label: "Response".into(), text: value_text(&record[RESPONSE_FIELD]) },
        ],
        Shape::Raw => vec![Segment { label: "Text".into(), text: value_text(&record[TEXT_FIELD]) }],
        Shape::Unknown { .. } => fallback_column
            .and_then(|column| record.get(column).map(|value| (column, value)))
            .filter(|(_, value)| !value.is_null())
            .map(|(column, value)| vec![Segment { label: column.to_string(), text: value_text(value) }])
            .unwrap_or_default(),
    }
}

/// The text used for a row's summary numbers: all segments joined by newlines.
pub fn record_text(record: &Record, fallback_column: Option<&str>) -> String {
    record_segments(record, fallback_column)
        .into_iter()
        .map(|s| s.text)
        .collect::<Vec<_>>()
        .join("\n")
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RowReport {
    pub index: usize,
    pub preview: String,
    pub token_count: usize,
    pub unit_count: usize,
    pub shape: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub rows: Vec<RowReport>,
    pub total_tokens: usize,
    pub total_units: usize,
    pub unit: MetricUnit,
}

impl BatchReport {
    pub fn totals(&self) -> TextMetrics {
        TextMetrics::from_totals(self.total_tokens, self.total_units, self.unit)
    }
}

#[derive(Debug, Clone)]
pub struct BatchOptions<'a> {
    pub selection: RowSelection,
    pub unit: MetricUnit,
    pub fallback_column: Option<&'a str>,
    pub preview_chars: usize,
}

/// Tokenizes every selected row and sums the counts.
pub fn analyze(records: &[Record], tokenizer: &dyn TokenizerBackend, options: &BatchOptions<'_>) -> Result<BatchReport> {
    let mut rows = Vec::new();
    let mut total_tokens = 0;
    let mut total_units = 0;

    for index in options.selection.indices(records.len()) {
        let record = &records[index];
        let text = record_text(record, options.fallback_column);
        let token_count = tokenizer.encode(&text)?.count();
        let unit_count = options.unit.count(&text);

        total_tokens += token_count;
        total_units += unit_count;
        rows.push(RowReport {
            index,
            preview: preview(&text, options.preview_chars),
            token_count,
            unit_count,
            shape: Shape::of_record(record).label(),
        });
    }

    log::debug!("Analyzed {} rows: {} tokens", rows.len(), total_tokens);
    Ok(BatchReport { rows, total_tokens, total_units, unit: options.unit })
}

/// One tokenized segment of a row, ready for rendering.
#[derive(Debug, Clone)]
pub struct SegmentResult {
    pub segment: Segment,
    pub result: TokenizationResult,
    pub metrics: TextMetrics,
}

#[derive(Debug, Clone)]
pub struct RowDetail {
    pub index: usize,
    pub shape: Shape,
    pub record: Record,
    pub segments: Vec<SegmentResult>,
}

/// Tokenizes each segment of row `index` separately.
pub fn visualize_row(
    records: &[Record],
    index: usize,
    tokenizer: &dyn TokenizerBackend,
    unit: MetricUnit,
    fallback_column: Option<&str>,
) -> Result<RowDetail> {
    let record = records.get(index).ok_or_else(|| {
        VisualizerError::InvalidRequest(format!(
            "row {} is out of range; the dataset has {} rows",
            index,
            records.len()
        ))
    })?;

    let segments = record_segments(record, fallback_column)
        .into_iter()
        .map(|segment| {
            let result = tokenizer.encode(&segment.text)?;
            let metrics = TextMetrics::compute(&segment.text, result.count(), unit, tokenizer.context_size());
            Ok(SegmentResult { segment, result, metrics })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(RowDetail { index, shape: Shape::of_record(record), record: record.clone(), segments })
}

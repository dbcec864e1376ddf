//! # Dataset Shape Detection
//!
//! Classifies records of an uploaded dataset into one of the shapes the
//! visualizer knows how to turn into text:
//!
//! - [`Shape::Chat`]: a `messages` array of `{role, content}` objects.
//! - [`Shape::Completion`]: a `prompt` / `response` pair.
//! - [`Shape::Raw`]: a single `text` field.
//! - [`Shape::Unknown`]: none of the above; carries every field name seen so a
//!   column can be picked by hand.
//!
//! The rules are checked in that order and the first match wins. A field whose
//! value is `null` counts as missing for the rules.

use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{json_kind, Result, VisualizerError};

/// One dataset line.
pub type Record = Map<String, Value>;

pub const MESSAGES_FIELD: &str = "messages";
pub const PROMPT_FIELD: &str = "prompt";
pub const RESPONSE_FIELD: &str = "response";
pub const TEXT_FIELD: &str = "text";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum Shape {
    Chat,
    Completion,
    Raw,
    Unknown { candidates: BTreeSet<String> },
}

impl Shape {
    /// Classifies a single record.
    pub fn of_record(record: &Record) -> Shape {
        classify(std::iter::once(record))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Shape::Chat => "Messages",
            Shape::Completion => "Prompt/Response",
            Shape::Raw => "Text",
            Shape::Unknown { .. } => "Unknown",
        }
    }
}

/// Classifies a sample of raw JSON values.
///
/// The sample is usually a prefix of the dataset. Fails with
/// [`VisualizerError::EmptyDataset`] for an empty sample and with
/// [`VisualizerError::InvalidRecord`] when any sampled value is not an object.
pub fn detect_shape(sample: &[Value]) -> Result<Shape> {
    if sample.is_empty() {
        return Err(VisualizerError::EmptyDataset);
    }
    let records = sample
        .iter()
        .enumerate()
        .map(|(index, value)| {
            value.as_object().ok_or(VisualizerError::InvalidRecord {
                index,
                found: json_kind(value),
            })
        })
        .collect::<Result<Vec<&Record>>>()?;
    Ok(classify(records))
}

fn classify<'a>(records: impl IntoIterator<Item = &'a Record>) -> Shape {
    let mut observed = BTreeSet::new();
    let mut present = BTreeSet::new();
    let mut messages_ok = true;

    for record in records {
        for (name, value) in record {
            observed.insert(name.clone());
            if value.is_null() {
                continue;
            }
            present.insert(name.as_str());
            if name == MESSAGES_FIELD && !is_message_list(value) {
                messages_ok = false;
            }
        }
    }

    if present.contains(MESSAGES_FIELD) && messages_ok {
        Shape::Chat
    } else if present.contains(PROMPT_FIELD) && present.contains(RESPONSE_FIELD) {
        Shape::Completion
    } else if present.contains(TEXT_FIELD) {
        Shape::Raw
    } else {
        Shape::Unknown { candidates: observed }
    }
}

fn is_message_list(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.iter().all(|item| {
            item.as_object()
                .map(|msg| msg.contains_key("role") && msg.contains_key("content"))
                .unwrap_or(false)
        }),
        _ => false,
    }
}

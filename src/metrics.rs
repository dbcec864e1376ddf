use serde::{Deserialize, Serialize};

/// What the "length" of a text is measured in next to its token count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricUnit {
    #[default]
    Character,
    Word,
}

impl MetricUnit {
    pub fn count(&self, text: &str) -> usize {
        match self {
            MetricUnit::Character => text.chars().count(),
            MetricUnit::Word => text.split_whitespace().count(),
        }
    }

    pub fn count_label(&self) -> &'static str {
        match self {
            MetricUnit::Character => "Character Count",
            MetricUnit::Word => "Word Count",
        }
    }

    pub fn average_label(&self) -> &'static str {
        match self {
            MetricUnit::Character => "Avg. Chars/Token",
            MetricUnit::Word => "Avg. Words/Token",
        }
    }

    /// Accepts `character`/`char`/`chars` and `word`/`words`, any case.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "character" | "char" | "chars" | "characters" => Some(MetricUnit::Character),
            "word" | "words" => Some(MetricUnit::Word),
            _ => None,
        }
    }
}

/// Summary numbers shown above a row of token chips.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextMetrics {
    pub token_count: usize,
    pub unit_count: usize,
    pub unit: MetricUnit,
    pub context_size: Option<usize>,
}

impl TextMetrics {
    pub fn compute(text: &str, token_count: usize, unit: MetricUnit, context_size: Option<usize>) -> Self {
        Self { token_count, unit_count: unit.count(text), unit, context_size }
    }

    pub fn from_totals(token_count: usize, unit_count: usize, unit: MetricUnit) -> Self {
        Self { token_count, unit_count, unit, context_size: None }
    }

    /// Units per token, `0.0` when there are no tokens.
    pub fn average_per_token(&self) -> f64 {
        if self.token_count == 0 {
            0.0
        } else {
            self.unit_count as f64 / self.token_count as f64
        }
    }

    /// Share of the model's context window used, as a percentage.
    pub fn context_usage_percent(&self) -> Option<f64> {
        match self.context_size {
            Some(size) if size > 0 => Some(self.token_count as f64 / size as f64 * 100.0),
            _ => None,
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{Result, VisualizerError};
use crate::metrics::MetricUnit;

/// Application settings, read from an optional JSON file.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    /// Root of the tokenizer repository (`huggingface/` and `uploads/`).
    pub cache_dir: PathBuf,
    /// Directory holding `index.html`.
    pub static_dir: PathBuf,
    /// tiktoken model names offered in the tokenizer picker.
    pub tiktoken_models: Vec<String>,
    pub metric_unit: MetricUnit,
    pub preview_chars: usize,
    /// How many leading records the shape detector looks at.
    pub detection_sample_size: usize,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            cache_dir: PathBuf::from(".cache"),
            static_dir: PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/src/ui")),
            tiktoken_models: ["gpt-5", "gpt-5.1", "gpt-4.1", "gpt-4o", "o1"]
                .iter()
                .map(|m| m.to_string())
                .collect(),
            metric_unit: MetricUnit::Character,
            preview_chars: 50,
            detection_sample_size: 20,
            max_upload_bytes: 64 * 1024 * 1024,
        }
    }
}

impl AppConfig {
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Err(VisualizerError::Config(format!("Config file not found at: {}", config_path.display())));
        }

        let mut file = File::open(config_path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;

        let config: AppConfig = serde_json::from_str(&contents).map_err(|e| {
            VisualizerError::Config(format!("Failed to deserialize JSON from {}: {}", config_path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.detection_sample_size == 0 {
            return Err(VisualizerError::Config("detection_sample_size must be at least 1".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(VisualizerError::Config("max_upload_bytes must be at least 1".into()));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.host.clone(), self.port)
    }
}

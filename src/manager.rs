//! # Tokenizer Manager
//!
//! Owns the cache of loaded tokenizers. A tokenizer is loaded the first time
//! its `source:name` key is requested and kept for the life of the manager.
//! The manager is created once at startup and handed to every request handler.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tokenizer::{HuggingFaceTokenizer, TiktokenTokenizer, TokenizerBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenizerSource {
    Tiktoken,
    #[serde(alias = "hf")]
    HuggingFace,
    Local,
}

impl TokenizerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenizerSource::Tiktoken => "tiktoken",
            TokenizerSource::HuggingFace => "huggingface",
            TokenizerSource::Local => "local",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "tiktoken" => Some(TokenizerSource::Tiktoken),
            "huggingface" | "hf" => Some(TokenizerSource::HuggingFace),
            "local" => Some(TokenizerSource::Local),
            _ => None,
        }
    }
}

impl fmt::Display for TokenizerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tokenizer as the user picks it in the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizerRef {
    pub name: String,
    pub source: TokenizerSource,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl TokenizerRef {
    pub fn new(name: impl Into<String>, source: TokenizerSource) -> Self {
        Self { name: name.into(), source, display_name: None }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.source, self.name)
    }

    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| format!("{} ({})", self.name, self.source))
    }
}

/// Turns a tokenizer identifier into a loaded tokenizer.
pub trait TokenizerProvider: Send + Sync {
    fn load(&self, name: &str, source: TokenizerSource) -> Result<Arc<dyn TokenizerBackend>>;
}

/// Loads tiktoken encodings and Hugging Face tokenizers (local or from the hub).
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProvider;

impl TokenizerProvider for DefaultProvider {
    fn load(&self, name: &str, source: TokenizerSource) -> Result<Arc<dyn TokenizerBackend>> {
        Ok(match source {
            TokenizerSource::Tiktoken => Arc::new(TiktokenTokenizer::new(name)?),
            TokenizerSource::HuggingFace => Arc::new(HuggingFaceTokenizer::load(name)?),
            TokenizerSource::Local => Arc::new(HuggingFaceTokenizer::load_local(name)?),
        })
    }
}

pub struct TokenizerManager {
    provider: Box<dyn TokenizerProvider>,
    cache: RwLock<HashMap<String, Arc<dyn TokenizerBackend>>>,
}

impl Default for TokenizerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenizerManager {
    pub fn new() -> Self {
        Self::with_provider(DefaultProvider)
    }

    pub fn with_provider(provider: impl TokenizerProvider + 'static) -> Self {
        Self { provider: Box::new(provider), cache: RwLock::new(HashMap::new()) }
    }

    /// Returns the cached tokenizer for `source:name`, loading it on first use.
    ///
    /// Failed loads are not cached, so a later request retries.
    pub fn get_tokenizer(&self, name: &str, source: TokenizerSource) -> Result<Arc<dyn TokenizerBackend>> {
        let key = format!("{}:{}", source, name);
        if let Some(tokenizer) = self.cache.read().unwrap_or_else(PoisonError::into_inner).get(&key) {
            return Ok(Arc::clone(tokenizer));
        }

        log::info!("Loading tokenizer {}", key);
        let loaded = self.provider.load(name, source)?;
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        Ok(Arc::clone(cache.entry(key).or_insert(loaded)))
    }

    pub fn get(&self, tokenizer: &TokenizerRef) -> Result<Arc<dyn TokenizerBackend>> {
        self.get_tokenizer(&tokenizer.name, tokenizer.source)
    }

    /// Loads a tokenizer stored in a local directory or file.
    pub fn load_local_tokenizer(&self, path: &str) -> Result<Arc<dyn TokenizerBackend>> {
        self.get_tokenizer(path, TokenizerSource::Local)
    }

    pub fn cached_keys(&self) -> Vec<String> {
        let cache = self.cache.read().unwrap_or_else(PoisonError::into_inner);
        let mut keys: Vec<String> = cache.keys().cloned().collect();
        keys.sort();
        keys
    }
}

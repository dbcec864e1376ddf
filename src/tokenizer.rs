//! # Tokenizer Backends
//!
//! Thin wrappers over the two tokenizer libraries the visualizer drives:
//! `tiktoken-rs` for the OpenAI BPE encodings and `tokenizers` for anything
//! described by a Hugging Face `tokenizer.json`. Both produce a
//! [`TokenizationResult`]: the token ids together with the slice of the input
//! each token covers.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tiktoken_rs::CoreBPE;
use tokenizers::Tokenizer;

use crate::error::{Result, VisualizerError};
use crate::repository;

/// One token produced for an input string.
///
/// `span` is a byte range into the input, always on UTF-8 character
/// boundaries, so `text == input[span.0..span.1]` unless the token had no
/// source text (special tokens), in which case `text` is the decoded token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub id: u32,
    pub text: String,
    pub span: (usize, usize),
}

/// Consecutive tokens that cover the same source span.
///
/// Byte-level tokenizers may need several tokens for one multi-byte character;
/// those end up in a single group with more than one token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenGroup<'a> {
    pub tokens: &'a [Token],
}

impl<'a> TokenGroup<'a> {
    pub fn text(&self) -> &'a str {
        self.tokens.first().map(|t| t.text.as_str()).unwrap_or("")
    }

    pub fn is_split(&self) -> bool {
        self.tokens.len() > 1
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TokenizationResult {
    pub tokens: Vec<Token>,
}

impl TokenizationResult {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn count(&self) -> usize {
        self.tokens.len()
    }

    pub fn ids(&self) -> Vec<u32> {
        self.tokens.iter().map(|t| t.id).collect()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.tokens.iter().map(|t| t.text.as_str()).collect()
    }

    pub fn groups(&self) -> Vec<TokenGroup<'_>> {
        let mut groups = Vec::new();
        let mut start = 0;
        for i in 1..=self.tokens.len() {
            if i == self.tokens.len() || self.tokens[i].span != self.tokens[start].span {
                groups.push(TokenGroup { tokens: &self.tokens[start..i] });
                start = i;
            }
        }
        groups
    }
}

/// A loaded tokenizer the visualizer can run text through.
pub trait TokenizerBackend: Send + Sync {
    /// Human readable name, e.g. `tiktoken (gpt-4o)`.
    fn name(&self) -> &str;

    fn encode(&self, text: &str) -> Result<TokenizationResult>;

    fn decode(&self, ids: &[u32]) -> Result<String>;

    /// Maximum number of tokens the associated model accepts, when known.
    fn context_size(&self) -> Option<usize> {
        None
    }
}

/// Moves `start` back and `end` forward to the nearest character boundaries.
fn widen_to_char_boundaries(text: &str, start: usize, end: usize) -> (usize, usize) {
    let mut start = start.min(text.len());
    let mut end = end.min(text.len()).max(start);
    while !text.is_char_boundary(start) {
        start -= 1;
    }
    while !text.is_char_boundary(end) {
        end += 1;
    }
    (start, end)
}

pub struct TiktokenTokenizer {
    name: String,
    bpe: CoreBPE,
    context_size: usize,
}

/// Model families missing from tiktoken-rs's model table that use
/// `o200k_base`, with their context sizes. Matched by name prefix.
const O200K_FAMILIES: [(&str, usize); 5] = [
    ("gpt-5", 400_000),
    ("gpt-4.1", 1_047_576),
    ("o1", 200_000),
    ("o3", 200_000),
    ("o4", 200_000),
];

fn o200k_family(model: &str) -> Option<usize> {
    O200K_FAMILIES
        .iter()
        .find(|(prefix, _)| model.starts_with(prefix))
        .map(|&(_, context_size)| context_size)
}

impl TiktokenTokenizer {
    /// Resolves the encoding used by `model`. Model names tiktoken does not
    /// know fall back to `cl100k_base`.
    pub fn new(model: &str) -> Result<Self> {
        let (bpe, context_size) = if let Some(context_size) = o200k_family(model) {
            (tiktoken_rs::o200k_base().map_err(|e| VisualizerError::tokenizer_load(model, e))?, context_size)
        } else {
            let bpe = match tiktoken_rs::get_bpe_from_model(model) {
                Ok(bpe) => bpe,
                Err(e) => {
                    log::warn!("tiktoken has no encoding for '{}' ({}); using cl100k_base", model, e);
                    tiktoken_rs::cl100k_base().map_err(|e| VisualizerError::tokenizer_load(model, e))?
                }
            };
            (bpe, tiktoken_rs::model::get_context_size(model))
        };
        Ok(Self { name: format!("tiktoken ({})", model), bpe, context_size })
    }
}

impl TokenizerBackend for TiktokenTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, text: &str) -> Result<TokenizationResult> {
        // Special-token markup in user text is tokenized as plain text.
        let ids = self.bpe.encode_ordinary(text);
        let pieces = self.bpe._decode_native_and_split(ids.clone());

        let mut tokens = Vec::with_capacity(ids.len());
        let mut cursor = 0;
        for (id, bytes) in ids.into_iter().zip(pieces) {
            let (start, end) = widen_to_char_boundaries(text, cursor, cursor + bytes.len());
            cursor += bytes.len();
            tokens.push(Token { id, text: text[start..end].to_string(), span: (start, end) });
        }
        Ok(TokenizationResult::new(tokens))
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.bpe
            .decode(ids.to_vec())
            .map_err(|e| VisualizerError::Encode(format!("Decoding failed for IDs {:?}: {}", ids, e)))
    }

    fn context_size(&self) -> Option<usize> {
        Some(self.context_size)
    }
}

#[derive(Debug)]
pub struct HuggingFaceTokenizer {
    name: String,
    tokenizer: Tokenizer,
}

impl HuggingFaceTokenizer {
    /// Loads a tokenizer from a `tokenizer.json` file, from a directory
    /// containing one, or from a Hugging Face hub repository id.
    pub fn load(identifier: &str) -> Result<Self> {
        Self::load_from(identifier, true)
    }

    /// Like [`HuggingFaceTokenizer::load`] but never goes to the hub.
    pub fn load_local(path: &str) -> Result<Self> {
        Self::load_from(path, false)
    }

    fn load_from(identifier: &str, allow_hub: bool) -> Result<Self> {
        let file = resolve_tokenizer_file(identifier, allow_hub)?;
        log::debug!("Loading Hugging Face tokenizer '{}' from {:?}", identifier, file);
        let tokenizer = Tokenizer::from_file(&file)
            .map_err(|e| VisualizerError::tokenizer_load(identifier, e))?;
        Ok(Self::from_tokenizer(identifier, tokenizer))
    }

    pub fn from_tokenizer(identifier: &str, tokenizer: Tokenizer) -> Self {
        let base = Path::new(identifier)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| identifier.to_string());
        Self { name: format!("HF ({})", base), tokenizer }
    }

    pub fn vocab_size(&self) -> usize {
        self.tokenizer.get_vocab_size(true)
    }
}

fn resolve_tokenizer_file(identifier: &str, allow_hub: bool) -> Result<PathBuf> {
    let path = Path::new(identifier);
    if path.is_file() {
        return Ok(path.to_path_buf());
    }
    if path.is_dir() {
        let file = path.join(repository::TOKENIZER_FILE);
        if file.is_file() {
            return Ok(file);
        }
        return Err(VisualizerError::tokenizer_load(
            identifier,
            format!("directory has no {}", repository::TOKENIZER_FILE),
        ));
    }
    if !allow_hub {
        return Err(VisualizerError::tokenizer_load(identifier, "no such file or directory"));
    }
    repository::fetch_hub_file(identifier, repository::TOKENIZER_FILE)
        .map_err(|e| VisualizerError::tokenizer_load(identifier, e))
}

/// Source slice covered by `span`, or the decoded token when the span is
/// empty (special tokens have no source text).
fn span_text(text: &str, span: (usize, usize), decode: impl FnOnce() -> Result<String>) -> Result<String> {
    if span.0 == span.1 {
        decode()
    } else {
        Ok(text[span.0..span.1].to_string())
    }
}

impl TokenizerBackend for HuggingFaceTokenizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn encode(&self, text: &str) -> Result<TokenizationResult> {
        let encoding = self
            .tokenizer
            .encode(text, false)
            .map_err(|e| {
                VisualizerError::Encode(format!("Encoding failed for a {} character input: {}", text.chars().count(), e))
            })?;

        let mut tokens = Vec::with_capacity(encoding.len());
        for (&id, &(start, end)) in encoding.get_ids().iter().zip(encoding.get_offsets()) {
            let (start, end) = widen_to_char_boundaries(text, start, end);
            let token_text = span_text(text, (start, end), || self.decode(&[id]))?;
            tokens.push(Token { id, text: token_text, span: (start, end) });
        }
        Ok(TokenizationResult::new(tokens))
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        self.tokenizer
            .decode(ids, false)
            .map_err(|e| VisualizerError::Encode(format!("Decoding failed for IDs {:?}: {}", ids, e)))
    }
}

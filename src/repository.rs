//! # Tokenizer Repository
//!
//! Keeps tokenizers the user added on disk under the cache directory:
//!
//! ```text
//! <cache_dir>/huggingface/<org>___<model>/   downloaded from the hub
//! <cache_dir>/uploads/<name>/                uploaded tokenizer files
//! <cache_dir>/uploads/<file>.json            single uploaded tokenizer.json
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use hf_hub::api::sync::Api;

use crate::error::{Result, VisualizerError};

pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// Files copied next to `tokenizer.json` when present in the hub repository.
const OPTIONAL_HUB_FILES: [&str; 2] = ["tokenizer_config.json", "special_tokens_map.json"];

const REPO_SEPARATOR: &str = "___";

/// Downloads one file of a hub model repository into the hf-hub cache and
/// returns its local path.
pub fn fetch_hub_file(repo_id: &str, filename: &str) -> std::result::Result<PathBuf, String> {
    let api = Api::new().map_err(|e| e.to_string())?;
    let repo = api.model(repo_id.to_string());
    repo.get(filename).map_err(|e| e.to_string())
}

#[derive(Debug, Clone)]
pub struct TokenizerRepository {
    hf_dir: PathBuf,
    uploads_dir: PathBuf,
}

impl TokenizerRepository {
    /// Opens the repository rooted at `base_dir`, creating its directories.
    pub fn open(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let repo = Self {
            hf_dir: base_dir.join("huggingface"),
            uploads_dir: base_dir.join("uploads"),
        };
        fs::create_dir_all(&repo.hf_dir)?;
        fs::create_dir_all(&repo.uploads_dir)?;
        Ok(repo)
    }

    /// Every stored tokenizer as `display name -> path`, sorted by name.
    pub fn available_models(&self) -> Result<BTreeMap<String, PathBuf>> {
        let mut models = BTreeMap::new();

        for entry in fs::read_dir(&self.hf_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                let name = entry.file_name().to_string_lossy().replace(REPO_SEPARATOR, "/");
                models.insert(format!("HF: {}", name), path);
            }
        }

        for entry in fs::read_dir(&self.uploads_dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().into_owned();
            if path.is_dir() {
                models.insert(format!("Local Dir: {}", name), path);
            } else if path.is_file() && name.ends_with(".json") {
                models.insert(format!("Local File: {}", name), path);
            }
        }

        Ok(models)
    }

    /// Fetches a tokenizer from the hub and stores it in the repository.
    ///
    /// `tokenizer.json` is required; the optional config files are copied when
    /// the repository has them. Blocks on network I/O.
    pub fn download_model(&self, repo_id: &str) -> Result<PathBuf> {
        let repo_id = repo_id.trim();
        if repo_id.is_empty() {
            return Err(VisualizerError::InvalidRequest("repository id is empty".into()));
        }

        let tokenizer_file = fetch_hub_file(repo_id, TOKENIZER_FILE).map_err(|e| {
            VisualizerError::Repository(format!("Failed to download model '{}': {}", repo_id, e))
        })?;

        let save_dir = self.hf_dir.join(repo_id.replace('/', REPO_SEPARATOR));
        fs::create_dir_all(&save_dir)?;
        fs::copy(&tokenizer_file, save_dir.join(TOKENIZER_FILE))?;

        for name in OPTIONAL_HUB_FILES {
            match fetch_hub_file(repo_id, name) {
                Ok(path) => {
                    fs::copy(&path, save_dir.join(name))?;
                }
                Err(e) => log::debug!("{} has no {}: {}", repo_id, name, e),
            }
        }

        log::info!("Downloaded tokenizer '{}' to {:?}", repo_id, save_dir);
        Ok(save_dir)
    }

    /// Writes a batch of uploaded files into `uploads/<model_name>/`.
    ///
    /// The model name keeps only ASCII alphanumerics, `-` and `_`; each file
    /// name is reduced to its last path component.
    pub fn save_uploaded_model_batch(&self, files: &[(String, Vec<u8>)], model_name: &str) -> Result<PathBuf> {
        let safe_name = sanitize_model_name(model_name);
        if safe_name.is_empty() {
            return Err(VisualizerError::InvalidRequest("Invalid model name".into()));
        }
        if files.is_empty() {
            return Err(VisualizerError::InvalidRequest("no files were uploaded".into()));
        }

        let save_dir = self.uploads_dir.join(&safe_name);
        fs::create_dir_all(&save_dir)?;
        for (filename, bytes) in files {
            let file_name = Path::new(filename).file_name().ok_or_else(|| {
                VisualizerError::InvalidRequest(format!("invalid file name '{}'", filename))
            })?;
            fs::write(save_dir.join(file_name), bytes)?;
        }

        log::info!("Saved {} uploaded file(s) to {:?}", files.len(), save_dir);
        Ok(save_dir)
    }
}

fn sanitize_model_name(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

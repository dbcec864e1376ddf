//! # Web Server Routes
//!
//! Actix handlers for the three visualizer modes (single prompt, chat, JSONL)
//! and for managing the tokenizer repository. Handlers return HTML fragments
//! that the page inserts as-is; the tokenizer catalog is the only JSON
//! response.

use std::collections::HashMap;
use std::sync::Arc;

use actix_files::NamedFile;
use actix_multipart::Multipart;
use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpResponse, HttpServer, ResponseError};
use futures_util::TryStreamExt;
use serde::Deserialize;

use crate::batch::{self, BatchOptions, RowSelection};
use crate::config::AppConfig;
use crate::error::VisualizerError;
use crate::jsonl;
use crate::manager::{TokenizerManager, TokenizerRef, TokenizerSource};
use crate::metrics::{MetricUnit, TextMetrics};
use crate::repository::TokenizerRepository;
use crate::tokenizer::{TokenizationResult, TokenizerBackend};
use crate::ui::render;

/// Everything a request handler needs, shared across actix workers.
pub struct AppState {
    pub config: AppConfig,
    pub repository: TokenizerRepository,
    pub manager: TokenizerManager,
}

impl AppState {
    pub fn new(config: AppConfig, repository: TokenizerRepository, manager: TokenizerManager) -> Self {
        Self { config, repository, manager }
    }
}

impl ResponseError for VisualizerError {
    fn status_code(&self) -> StatusCode {
        match self {
            VisualizerError::EmptyDataset
            | VisualizerError::InvalidRecord { .. }
            | VisualizerError::Parse { .. }
            | VisualizerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            VisualizerError::TokenizerLoad { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            VisualizerError::Repository(_) => StatusCode::BAD_GATEWAY,
            VisualizerError::Encode(_)
            | VisualizerError::Config(_)
            | VisualizerError::Internal(_)
            | VisualizerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        log::warn!("Request failed: {}", self);
        HttpResponse::build(self.status_code())
            .content_type("text/html; charset=utf-8")
            .body(render::error_block(&self.to_string()))
    }
}

impl From<BlockingError> for VisualizerError {
    fn from(err: BlockingError) -> Self {
        VisualizerError::Internal(err.to_string())
    }
}

fn html(body: String) -> HttpResponse {
    HttpResponse::Ok().content_type("text/html; charset=utf-8").body(body)
}

/// Serves the single-page UI (`index.html`).
pub async fn index(state: web::Data<AppState>) -> actix_web::Result<NamedFile> {
    Ok(NamedFile::open_async(state.config.static_dir.join("index.html")).await?)
}

/// Configured tiktoken models followed by everything in the repository.
pub fn tokenizer_catalog(config: &AppConfig, repository: &TokenizerRepository) -> Result<Vec<TokenizerRef>, VisualizerError> {
    let mut catalog: Vec<TokenizerRef> = config
        .tiktoken_models
        .iter()
        .map(|m| TokenizerRef::new(m.clone(), TokenizerSource::Tiktoken).with_display_name(format!("tiktoken: {}", m)))
        .collect();
    for (display_name, path) in repository.available_models()? {
        catalog.push(
            TokenizerRef::new(path.to_string_lossy().into_owned(), TokenizerSource::Local).with_display_name(display_name),
        );
    }
    Ok(catalog)
}

pub async fn list_tokenizers(state: web::Data<AppState>) -> Result<HttpResponse, VisualizerError> {
    let catalog = tokenizer_catalog(&state.config, &state.repository)?;
    Ok(HttpResponse::Ok().json(catalog))
}

fn encode_with(tokenizer: &dyn TokenizerBackend, text: &str, unit: MetricUnit) -> Result<(TokenizationResult, TextMetrics), VisualizerError> {
    let result = tokenizer.encode(text)?;
    let metrics = TextMetrics::compute(text, result.count(), unit, tokenizer.context_size());
    Ok((result, metrics))
}

/// Runs `text` through every selected tokenizer. A tokenizer that fails to
/// load or encode shows its own error block; the others still render.
fn render_comparison(manager: &TokenizerManager, tokenizers: &[TokenizerRef], text: &str, unit: MetricUnit) -> String {
    let show_header = tokenizers.len() > 1;
    let blocks: Vec<String> = tokenizers
        .iter()
        .map(|t| {
            let outcome = manager.get(t).and_then(|tk| encode_with(tk.as_ref(), text, unit));
            if let Err(e) = &outcome {
                log::warn!("Tokenizer {} failed: {}", t.cache_key(), e);
            }
            render::tokenizer_result(&t.label(), show_header, &outcome)
        })
        .collect();
    render::comparison(&blocks)
}

fn require_tokenizers(tokenizers: &[TokenizerRef]) -> Result<(), VisualizerError> {
    if tokenizers.is_empty() {
        return Err(VisualizerError::InvalidRequest("Please select at least one tokenizer.".into()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct TokenizeRequest {
    pub text: String,
    pub tokenizers: Vec<TokenizerRef>,
    #[serde(default)]
    pub metric_unit: Option<MetricUnit>,
}

/// Single Prompt mode.
pub async fn tokenize(state: web::Data<AppState>, body: web::Json<TokenizeRequest>) -> Result<HttpResponse, VisualizerError> {
    let request = body.into_inner();
    require_tokenizers(&request.tokenizers)?;
    if request.text.is_empty() {
        return Ok(html(String::new()));
    }
    let unit = request.metric_unit.unwrap_or(state.config.metric_unit);
    let fragment =
        web::block(move || render_comparison(&state.manager, &request.tokenizers, &request.text, unit)).await?;
    Ok(html(fragment))
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tokenizers: Vec<TokenizerRef>,
    #[serde(default)]
    pub metric_unit: Option<MetricUnit>,
}

const CHAT_ROLES: [&str; 3] = ["system", "user", "assistant"];

/// Chat mode: every non-empty message is tokenized on its own.
pub async fn chat(state: web::Data<AppState>, body: web::Json<ChatRequest>) -> Result<HttpResponse, VisualizerError> {
    let request = body.into_inner();
    require_tokenizers(&request.tokenizers)?;
    let unit = request.metric_unit.unwrap_or(state.config.metric_unit);

    let fragment = web::block(move || {
        let mut out = String::new();
        for (i, msg) in request.messages.iter().enumerate() {
            if msg.content.is_empty() {
                continue;
            }
            let role = if CHAT_ROLES.contains(&msg.role.as_str()) { msg.role.as_str() } else { "user" };
            let body = render_comparison(&state.manager, &request.tokenizers, &msg.content, unit);
            out.push_str(&render::chat_message(i + 1, role, &body));
        }
        out
    })
    .await?;
    Ok(html(fragment))
}

#[derive(Debug)]
pub struct UploadedFile {
    pub field: String,
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// A decoded multipart body: plain fields by name plus uploaded files.
#[derive(Debug, Default)]
pub struct MultipartForm {
    pub fields: HashMap<String, String>,
    pub files: Vec<UploadedFile>,
}

impl MultipartForm {
    /// Non-blank text field, trimmed.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }

    pub fn number(&self, name: &str) -> Result<Option<usize>, VisualizerError> {
        self.text(name)
            .map(|raw| {
                raw.parse::<usize>().map_err(|_| {
                    VisualizerError::InvalidRequest(format!("'{}' must be a non-negative integer, got '{}'", name, raw))
                })
            })
            .transpose()
    }

    pub fn file(&self, field: &str) -> Option<&UploadedFile> {
        self.files.iter().find(|f| f.field == field)
    }
}

/// Reads a whole multipart payload into memory, refusing more than
/// `max_bytes` in total.
pub async fn read_multipart(mut payload: Multipart, max_bytes: usize) -> Result<MultipartForm, VisualizerError> {
    let mut form = MultipartForm::default();
    let mut total = 0usize;

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| VisualizerError::InvalidRequest(format!("Error reading multipart stream: {}", e)))?
    {
        let (name, filename) = {
            let disposition = field.content_disposition();
            (
                disposition.get_name().unwrap_or_default().to_string(),
                disposition.get_filename().map(str::to_string),
            )
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(|e| {
            VisualizerError::InvalidRequest(format!("Error reading data for field '{}': {}", name, e))
        })? {
            total += chunk.len();
            if total > max_bytes {
                return Err(VisualizerError::InvalidRequest(format!("upload exceeds the {} byte limit", max_bytes)));
            }
            bytes.extend_from_slice(&chunk);
        }

        match filename {
            // Browsers send an empty filename for a file input left blank.
            Some(filename) if filename.is_empty() => {}
            Some(filename) => form.files.push(UploadedFile { field: name, filename, bytes }),
            None => {
                form.fields.insert(name, String::from_utf8_lossy(&bytes).into_owned());
            }
        }
    }
    Ok(form)
}

fn row_selection(form: &MultipartForm) -> Result<RowSelection, VisualizerError> {
    Ok(match form.text("row_mode").unwrap_or("all") {
        "all" => RowSelection::All,
        "first" => RowSelection::FirstN { n: form.number("n")?.unwrap_or(10).max(1) },
        "range" => RowSelection::Range {
            start: form.number("start")?.unwrap_or(0),
            end: form.number("end")?.unwrap_or(10),
        },
        other => return Err(VisualizerError::InvalidRequest(format!("unknown row mode '{}'", other))),
    })
}

/// JSONL mode: batch statistics over an uploaded dataset, optionally with the
/// detailed breakdown of one row. Only one tokenizer is used.
pub async fn analyze_jsonl(state: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, VisualizerError> {
    let form = read_multipart(payload, state.config.max_upload_bytes).await?;

    let bytes = form
        .file("file")
        .map(|f| f.bytes.clone())
        .ok_or_else(|| VisualizerError::InvalidRequest("Upload a .jsonl file.".into()))?;
    let name = form
        .text("tokenizer")
        .ok_or_else(|| VisualizerError::InvalidRequest("Please select a tokenizer.".into()))?;
    let source = match form.text("source") {
        Some(raw) => TokenizerSource::parse(raw)
            .ok_or_else(|| VisualizerError::InvalidRequest(format!("unknown tokenizer source '{}'", raw)))?,
        None => TokenizerSource::Tiktoken,
    };
    let mut tokenizer_ref = TokenizerRef::new(name, source);
    if let Some(label) = form.text("tokenizer_label") {
        tokenizer_ref = tokenizer_ref.with_display_name(label);
    }
    let unit = form.text("metric_unit").and_then(MetricUnit::parse).unwrap_or(state.config.metric_unit);
    let selection = row_selection(&form)?;
    let row = form.number("row")?;
    let column = form.text("column").map(str::to_string);

    let fragment = web::block(move || -> Result<String, VisualizerError> {
        let shape = jsonl::detect_dataset_shape(bytes.as_slice(), state.config.detection_sample_size)?;
        let records = jsonl::read_records(&bytes)?;

        let tokenizer: Arc<dyn TokenizerBackend> = state.manager.get(&tokenizer_ref)?;
        let options = BatchOptions {
            selection,
            unit,
            fallback_column: column.as_deref(),
            preview_chars: state.config.preview_chars,
        };
        let report = batch::analyze(&records, tokenizer.as_ref(), &options)?;
        let detail = row
            .map(|index| batch::visualize_row(&records, index, tokenizer.as_ref(), unit, column.as_deref()))
            .transpose()?;

        log::info!("Analyzed {} of {} rows with {}", report.rows.len(), records.len(), tokenizer_ref.cache_key());
        Ok(render::batch_page(records.len(), &shape, &tokenizer_ref.label(), &report, detail.as_ref()))
    })
    .await??;
    Ok(html(fragment))
}

#[derive(Debug, Deserialize)]
pub struct DownloadRequest {
    pub repo_id: String,
}

/// Downloads a tokenizer from the Hugging Face hub into the repository.
pub async fn download_tokenizer(state: web::Data<AppState>, body: web::Json<DownloadRequest>) -> Result<HttpResponse, VisualizerError> {
    let repo_id = body.into_inner().repo_id;
    let message = format!("Downloaded {}!", repo_id.trim());
    web::block(move || state.repository.download_model(&repo_id)).await??;
    Ok(html(render::success_block(&message)))
}

/// Stores uploaded tokenizer files under a model name.
pub async fn upload_tokenizer(state: web::Data<AppState>, payload: Multipart) -> Result<HttpResponse, VisualizerError> {
    let form = read_multipart(payload, state.config.max_upload_bytes).await?;
    let model_name = form
        .text("model_name")
        .ok_or_else(|| VisualizerError::InvalidRequest("Please enter a Model Name.".into()))?
        .to_string();
    let files: Vec<(String, Vec<u8>)> = form.files.into_iter().map(|f| (f.filename, f.bytes)).collect();

    let saved = web::block(move || state.repository.save_uploaded_model_batch(&files, &model_name)).await??;
    Ok(html(render::success_block(&format!("Saved tokenizer to {}!", saved.display()))))
}

/// Registers every route on an app or test service.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/api/tokenizers", web::get().to(list_tokenizers))
        .route("/api/tokenize", web::post().to(tokenize))
        .route("/api/chat", web::post().to(chat))
        .route("/api/jsonl", web::post().to(analyze_jsonl))
        .route("/api/tokenizers/download", web::post().to(download_tokenizer))
        .route("/api/tokenizers/upload", web::post().to(upload_tokenizer));
}

/// Initializes and runs the Actix web server on the configured address.
pub async fn run_server(config: AppConfig) -> std::io::Result<()> {
    let repository = TokenizerRepository::open(&config.cache_dir)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    let json_limit = config.max_upload_bytes;
    let address = config.bind_address();
    let state = web::Data::new(AppState::new(config, repository, TokenizerManager::new()));

    log::info!("Starting server at http://{}:{}/", address.0, address.1);
    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::JsonConfig::default().limit(json_limit))
            .configure(configure)
    })
    .bind(address)?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::test_support::CountingProvider;
    use actix_web::{http::header, test};
    use serde_json::json;

    fn state(dir: &std::path::Path) -> web::Data<AppState> {
        let config = AppConfig { cache_dir: dir.to_path_buf(), ..AppConfig::default() };
        let repository = TokenizerRepository::open(dir).unwrap();
        web::Data::new(AppState::new(config, repository, TokenizerManager::with_provider(CountingProvider::default())))
    }

    fn multipart_body(boundary: &str, fields: &[(&str, &str)], file: Option<(&str, &str, &str)>) -> String {
        let mut body = String::new();
        for (name, value) in fields {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                boundary, name, value
            ));
        }
        if let Some((name, filename, content)) = file {
            body.push_str(&format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n{}\r\n",
                boundary, name, filename, content
            ));
        }
        body.push_str(&format!("--{}--\r\n", boundary));
        body
    }

    async fn call(state: web::Data<AppState>, req: test::TestRequest) -> (StatusCode, String) {
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let resp = test::call_service(&app, req.to_request()).await;
        let status = resp.status();
        let body = test::read_body(resp).await;
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[actix_rt::test]
    async fn test_tokenize_two_tokenizers_side_by_side() {
        let dir = tempfile::tempdir().unwrap();
        let req = test::TestRequest::post().uri("/api/tokenize").set_json(json!({
            "text": "hello big world",
            "tokenizers": [
                {"name": "a", "source": "tiktoken"},
                {"name": "missing-b", "source": "huggingface", "display_name": "HF: b"}
            ]
        }));
        let (status, body) = call(state(dir.path()), req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("comparison columns"));
        assert_eq!(body.matches("class=\"token-chip\"").count(), 3);
        assert!(body.contains("Error processing with HF: b"));
    }

    #[actix_rt::test]
    async fn test_tokenize_requires_a_tokenizer() {
        let dir = tempfile::tempdir().unwrap();
        let req = test::TestRequest::post()
            .uri("/api/tokenize")
            .set_json(json!({"text": "hi", "tokenizers": []}));
        let (status, body) = call(state(dir.path()), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Please select at least one tokenizer."));
    }

    #[actix_rt::test]
    async fn test_chat_skips_empty_messages_and_normalizes_roles() {
        let dir = tempfile::tempdir().unwrap();
        let req = test::TestRequest::post().uri("/api/chat").set_json(json!({
            "messages": [
                {"role": "system", "content": "You are a helpful assistant."},
                {"role": "user", "content": ""},
                {"role": "narrator", "content": "Hello!"}
            ],
            "tokenizers": [{"name": "a", "source": "tiktoken"}],
            "metric_unit": "word"
        }));
        let (status, body) = call(state(dir.path()), req).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("Message 1 &middot; system"));
        assert!(!body.contains("Message 2"));
        assert!(body.contains("Message 3 &middot; user"));
        assert!(body.contains("Word Count"));
    }

    #[actix_rt::test]
    async fn test_jsonl_batch_with_row_detail() {
        let dir = tempfile::tempdir().unwrap();
        let boundary = "XBOUNDARY";
        let data = "{\"prompt\": \"a b\", \"response\": \"c\"}\n{\"prompt\": \"d\", \"response\": \"e f g\"}\n";
        let body = multipart_body(
            boundary,
            &[("tokenizer", "a"), ("source", "tiktoken"), ("row_mode", "all"), ("row", "1")],
            Some(("file", "data.jsonl", data)),
        );
        let req = test::TestRequest::post()
            .uri("/api/jsonl")
            .insert_header((header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary)))
            .set_payload(body);
        let (status, body) = call(state(dir.path()), req).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        assert!(body.contains("Loaded 2 rows."));
        assert!(body.contains("Detected format: <strong>Prompt/Response</strong>"));
        assert!(body.contains("Detailed Visualization: row 1"));
        assert!(body.contains("<h4>Response</h4>"));
    }

    #[actix_rt::test]
    async fn test_jsonl_parse_error_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let boundary = "XBOUNDARY";
        let body = multipart_body(
            boundary,
            &[("tokenizer", "a")],
            Some(("file", "bad.jsonl", "{\"text\": \"ok\"}\n{oops\n")),
        );
        let req = test::TestRequest::post()
            .uri("/api/jsonl")
            .insert_header((header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary)))
            .set_payload(body);
        let (status, body) = call(state(dir.path()), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("<div class=\"error-message\">line 2:"));
    }

    #[actix_rt::test]
    async fn test_catalog_lists_tiktoken_then_repository() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("uploads/mine")).unwrap();
        let req = test::TestRequest::get().uri("/api/tokenizers");
        let (status, body) = call(state(dir.path()), req).await;
        assert_eq!(status, StatusCode::OK);
        let catalog: Vec<TokenizerRef> = serde_json::from_str(&body).unwrap();
        assert_eq!(catalog[0].display_name.as_deref(), Some("tiktoken: gpt-5"));
        let last = catalog.last().unwrap();
        assert_eq!(last.source, TokenizerSource::Local);
        assert_eq!(last.display_name.as_deref(), Some("Local Dir: mine"));
    }

    #[actix_rt::test]
    async fn test_upload_tokenizer_requires_model_name() {
        let dir = tempfile::tempdir().unwrap();
        let boundary = "XBOUNDARY";
        let body = multipart_body(boundary, &[], Some(("files", "tokenizer.json", "{}")));
        let req = test::TestRequest::post()
            .uri("/api/tokenizers/upload")
            .insert_header((header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", boundary)))
            .set_payload(body);
        let (status, body) = call(state(dir.path()), req).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("Please enter a Model Name."));
    }
}

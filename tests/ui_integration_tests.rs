use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use serde_json::json;
use std::path::{Path, PathBuf};
use tokenizer_visualizer::config::AppConfig;
use tokenizer_visualizer::manager::TokenizerManager;
use tokenizer_visualizer::repository::TokenizerRepository;
use tokenizer_visualizer::ui::routes::{configure, AppState};

const BOUNDARY: &str = "----visualizer-test-boundary";

fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/wordlevel/tokenizer.json")
}

fn app_state(cache_dir: &Path) -> web::Data<AppState> {
    let config = AppConfig { cache_dir: cache_dir.to_path_buf(), ..AppConfig::default() };
    let repository = TokenizerRepository::open(cache_dir).unwrap();
    web::Data::new(AppState::new(config, repository, TokenizerManager::new()))
}

fn multipart(fields: &[(&str, &str)], file: Option<(&str, &str, &str)>) -> (String, String) {
    let mut body = String::new();
    for (name, value) in fields {
        body.push_str(&format!("--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n", BOUNDARY, name, value));
    }
    if let Some((name, filename, content)) = file {
        body.push_str(&format!(
            "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n{}\r\n",
            BOUNDARY, name, filename, content
        ));
    }
    body.push_str(&format!("--{}--\r\n", BOUNDARY));
    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

macro_rules! send {
    ($state:expr, $req:expr) => {{
        let app = test::init_service(App::new().app_data($state).configure(configure)).await;
        let resp = test::call_service(&app, $req.to_request()).await;
        let status = resp.status();
        let body = test::read_body(resp).await;
        (status, String::from_utf8(body.to_vec()).unwrap())
    }};
}

#[actix_rt::test]
async fn test_index_serves_page() {
    let dir = tempfile::tempdir().unwrap();
    let (status, body) = send!(app_state(dir.path()), test::TestRequest::get().uri("/"));
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<title>Tokenizer Visualizer</title>"));
}

#[actix_rt::test]
async fn test_tokenize_with_tiktoken() {
    let dir = tempfile::tempdir().unwrap();
    let req = test::TestRequest::post().uri("/api/tokenize").set_json(json!({
        "text": "Hello world",
        "tokenizers": [{"name": "gpt-4o", "source": "tiktoken"}],
        "metric_unit": "character"
    }));
    let (status, body) = send!(app_state(dir.path()), req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.matches("class=\"token-chip\"").count(), 2);
    assert!(body.contains("ID: 13225"));
    assert!(body.contains("ID: 2375"));
    assert!(!body.contains("<h2>Comparison</h2>"));
}

#[actix_rt::test]
async fn test_compare_tiktoken_with_local_tokenizer() {
    let dir = tempfile::tempdir().unwrap();
    let local = fixture_path().to_string_lossy().into_owned();
    let req = test::TestRequest::post().uri("/api/tokenize").set_json(json!({
        "text": "hello world!",
        "tokenizers": [
            {"name": "gpt-4", "source": "tiktoken"},
            {"name": local, "source": "local", "display_name": "Local File: tokenizer.json"}
        ]
    }));
    let (status, body) = send!(app_state(dir.path()), req);
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("<h2>Comparison</h2><div class=\"comparison columns\">"));
    assert!(body.contains("<h3>Local File: tokenizer.json</h3>"));
    assert!(!body.contains("error-message"));
}

#[actix_rt::test]
async fn test_unknown_local_tokenizer_shows_scoped_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope/tokenizer.json").to_string_lossy().into_owned();
    let req = test::TestRequest::post().uri("/api/tokenize").set_json(json!({
        "text": "Hello",
        "tokenizers": [
            {"name": "gpt-4o", "source": "tiktoken"},
            {"name": missing, "source": "local", "display_name": "broken"}
        ]
    }));
    let (status, body) = send!(app_state(dir.path()), req);
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("Error processing with broken"));
    assert_eq!(body.matches("class=\"token-chip\"").count(), 1);
}

#[actix_rt::test]
async fn test_chat_tokenizes_each_message() {
    let dir = tempfile::tempdir().unwrap();
    let req = test::TestRequest::post().uri("/api/chat").set_json(json!({
        "messages": [
            {"role": "system", "content": "You are a helpful assistant."},
            {"role": "user", "content": "Hello world"},
            {"role": "assistant", "content": ""}
        ],
        "tokenizers": [{"name": "gpt-4o", "source": "tiktoken"}]
    }));
    let (status, body) = send!(app_state(dir.path()), req);
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.matches("<section class=\"chat-message\">").count(), 2);
    assert!(body.contains("Message 2 &middot; user"));
}

#[actix_rt::test]
async fn test_jsonl_chat_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let data = concat!(
        "{\"messages\": [{\"role\": \"user\", \"content\": \"Hello world\"}, {\"role\": \"assistant\", \"content\": \"Hi\"}]}\n",
        "\n",
        "{\"messages\": [{\"role\": \"user\", \"content\": \"Hello\"}], \"id\": 7}\n"
    );
    let (content_type, body) = multipart(
        &[("tokenizer", "gpt-4o"), ("source", "tiktoken"), ("row_mode", "first"), ("n", "1"), ("row", "0")],
        Some(("file", "chat.jsonl", data)),
    );
    let req = test::TestRequest::post()
        .uri("/api/jsonl")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body);
    let (status, body) = send!(app_state(dir.path()), req);
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body.contains("Loaded 2 rows."));
    assert!(body.contains("Detected format: <strong>Messages</strong>"));
    assert!(body.contains("Processed 1 rows"));
    assert!(body.contains("<h3>Messages Format Detected</h3>"));
    assert!(body.contains("<h4>Assistant</h4>"));
}

#[actix_rt::test]
async fn test_jsonl_unknown_dataset_lists_candidates() {
    let dir = tempfile::tempdir().unwrap();
    let data = "{\"question\": \"why?\", \"answer\": \"because\"}\n{\"question\": \"how?\", \"meta\": null}\n";
    let (content_type, body) = multipart(&[("tokenizer", "gpt-4o")], Some(("file", "qa.jsonl", data)));
    let req = test::TestRequest::post()
        .uri("/api/jsonl")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body);
    let (status, body) = send!(app_state(dir.path()), req);
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body.contains("<li><code>answer</code></li><li><code>meta</code></li><li><code>question</code></li>"));
}

#[actix_rt::test]
async fn test_jsonl_errors() {
    let dir = tempfile::tempdir().unwrap();

    let (content_type, body) = multipart(&[("tokenizer", "gpt-4o")], Some(("file", "empty.jsonl", "\n\n")));
    let req = test::TestRequest::post()
        .uri("/api/jsonl")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body);
    let (status, body) = send!(app_state(dir.path()), req);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("the dataset is empty"));

    let (content_type, body) = multipart(&[("tokenizer", "gpt-4o")], Some(("file", "list.jsonl", "[1, 2]\n")));
    let req = test::TestRequest::post()
        .uri("/api/jsonl")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body);
    let (status, body) = send!(app_state(dir.path()), req);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("record 0 is not a JSON object (found array)"));

    let (content_type, body) = multipart(&[], Some(("file", "data.jsonl", "{\"text\": \"a\"}\n")));
    let req = test::TestRequest::post()
        .uri("/api/jsonl")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body);
    let (status, body) = send!(app_state(dir.path()), req);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("Please select a tokenizer."));
}

#[actix_rt::test]
async fn test_upload_then_listed_in_catalog() {
    let dir = tempfile::tempdir().unwrap();
    let tokenizer_json = std::fs::read_to_string(fixture_path()).unwrap();
    let (content_type, body) =
        multipart(&[("model_name", "word level")], Some(("files", "tokenizer.json", &tokenizer_json)));
    let req = test::TestRequest::post()
        .uri("/api/tokenizers/upload")
        .insert_header((header::CONTENT_TYPE, content_type))
        .set_payload(body);
    let (status, body) = send!(app_state(dir.path()), req);
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert!(body.contains("success-message"));
    assert!(dir.path().join("uploads/wordlevel/tokenizer.json").is_file());

    let (status, body) = send!(app_state(dir.path()), test::TestRequest::get().uri("/api/tokenizers"));
    assert_eq!(status, StatusCode::OK);
    let catalog: serde_json::Value = serde_json::from_str(&body).unwrap();
    let entry = catalog
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["display_name"] == "Local Dir: wordlevel")
        .expect("uploaded tokenizer is listed");
    assert_eq!(entry["source"], "local");
}

#[actix_rt::test]
async fn test_download_rejects_blank_repo_id() {
    let dir = tempfile::tempdir().unwrap();
    let req = test::TestRequest::post().uri("/api/tokenizers/download").set_json(json!({"repo_id": "   "}));
    let (status, body) = send!(app_state(dir.path()), req);
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.contains("repository id is empty"));
}

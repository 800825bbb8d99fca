use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reelview::assistant::{
    AssistantError, ChatModel, ChatRequest, ChatRole, ChatTurn, GenerativeClient,
};
use reelview::search::{SearchBackend, SearchClient, SearchError};

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.5-flash:generateContent";

fn question(query: &str) -> ChatRequest {
    ChatRequest {
        query: query.into(),
        history: Vec::new(),
    }
}

#[tokio::test]
async fn test_assistant_posts_prompt_and_returns_answer() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .and(header("x-goog-api-key", "test-key"))
        .and(body_partial_json(json!({
            "contents": [
                {"role": "user", "parts": [{"text": "Is it long?"}]},
                {"role": "model", "parts": [{"text": "Which film?"}]},
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "About two hours."}]}
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = GenerativeClient::new(Some(mock_server.uri()), "gemini-2.5-flash", Some("test-key".into()));
    let reply = client
        .answer(&ChatRequest {
            query: "Night Train".into(),
            history: vec![
                ChatTurn {
                    role: ChatRole::User,
                    content: "Is it long?".into(),
                },
                ChatTurn {
                    role: ChatRole::Assistant,
                    content: "Which film?".into(),
                },
            ],
        })
        .await
        .unwrap();

    assert_eq!(reply.answer, "About two hours.");
}

#[tokio::test]
async fn test_assistant_maps_http_errors() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(500).set_body_string("quota exceeded"))
        .mount(&mock_server)
        .await;

    let client = GenerativeClient::new(Some(mock_server.uri()), "gemini-2.5-flash", None);
    let err = client.answer(&question("hi")).await.unwrap_err();
    assert!(matches!(err, AssistantError::Status(500)));
}

#[tokio::test]
async fn test_assistant_rejects_empty_candidates() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(GENERATE_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .mount(&mock_server)
        .await;

    let client = GenerativeClient::new(Some(mock_server.uri()), "gemini-2.5-flash", None);
    let err = client.answer(&question("hi")).await.unwrap_err();
    assert!(matches!(err, AssistantError::EmptyResponse));
}

#[tokio::test]
async fn test_search_sends_query_and_maps_results() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .and(header("authorization", "Bearer search-key"))
        .and(body_partial_json(json!({"query": "heist", "pageSize": 10})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "summary": {"summaryText": "Night Train is a heist film."},
            "results": [
                {"document": {"structData": {
                    "file_name": "Night Train",
                    "public_url": "https://cdn.example/night-train.mp4"
                }}}
            ]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = SearchClient::new(
        Some(format!("{}/search", mock_server.uri())),
        Some("search-key".into()),
    );
    let output = client.search("heist").await.unwrap();

    assert_eq!(output.summary, "Night Train is a heist film.");
    assert_eq!(output.results.len(), 1);
    assert_eq!(output.results[0].title, "Night Train");
    assert_eq!(output.results[0].url, "https://cdn.example/night-train.mp4");
}

#[tokio::test]
async fn test_search_errors_and_missing_endpoint() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/search"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&mock_server)
        .await;

    let client = SearchClient::new(Some(format!("{}/search", mock_server.uri())), None);
    let err = client.search("heist").await.unwrap_err();
    assert!(matches!(err, SearchError::Status(403)));

    let unconfigured = SearchClient::new(None, None);
    let err = unconfigured.search("heist").await.unwrap_err();
    assert!(matches!(err, SearchError::NotConfigured));
}

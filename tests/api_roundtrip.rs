use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tempfile::TempDir;

use reelview::api::{self, ApiSettings, AppState};
use reelview::assistant::{AssistantError, ChatModel, ChatReply, ChatRequest};
use reelview::catalog::{CatalogReader, CatalogStore};
use reelview::client::{CatalogClient, ClientError};
use reelview::search::{SearchBackend, SearchError, SearchHit, SearchOutput};
use reelview::signing::{DisabledSigner, SIGNED_URL_TTL};

struct EchoAssistant;

#[async_trait]
impl ChatModel for EchoAssistant {
    async fn answer(&self, request: &ChatRequest) -> Result<ChatReply, AssistantError> {
        Ok(ChatReply {
            answer: request.query.clone(),
        })
    }
}

struct OneHitSearch;

#[async_trait]
impl SearchBackend for OneHitSearch {
    async fn search(&self, query: &str) -> Result<SearchOutput, SearchError> {
        Ok(SearchOutput {
            summary: format!("Results for {query}"),
            results: vec![SearchHit {
                title: "Night Train".into(),
                url: "https://cdn.example/night-train.mp4".into(),
                snippet: None,
                poster_url: None,
            }],
            raw_response: None,
        })
    }
}

/// Serves the router on an ephemeral port over a fresh catalog database.
async fn serve(temp: &TempDir) -> (String, CatalogStore) {
    let db = temp.path().join("catalog.db");
    let store = CatalogStore::open(&db).unwrap();
    let state = AppState {
        catalog: Arc::new(CatalogReader::new(&db)),
        signer: Arc::new(DisabledSigner),
        assistant: Arc::new(EchoAssistant),
        search: Arc::new(OneHitSearch),
        settings: Arc::new(ApiSettings {
            collection: "media_assets".into(),
            public_storage_prefix: "https://storage.googleapis.com/".into(),
            signed_url_ttl: SIGNED_URL_TTL,
            storage_root: temp.path().join("storage"),
        }),
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, api::router(state)).await.unwrap();
    });
    (format!("http://{addr}"), store)
}

async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_empty_catalog_reports_not_found() {
    let temp = tempfile::tempdir().unwrap();
    let (server, _store) = serve(&temp).await;

    let client = CatalogClient::new(&server).unwrap();
    let err = blocking(move || client.movies()).await.unwrap_err();
    match err {
        ClientError::Status { status, body } => {
            assert_eq!(status, 404);
            assert_eq!(body, "No movies found");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_movies_and_search_round_trip() {
    let temp = tempfile::tempdir().unwrap();
    let (server, store) = serve(&temp).await;
    store
        .upsert_document(
            "media_assets",
            "yt",
            &json!({
                "file_name": "Trailer",
                "source": "youtube",
                "file_path": "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
                "contentType": "movie",
                "rating": "PG"
            }),
        )
        .unwrap();
    store
        .upsert_document(
            "media_assets",
            "stored",
            &json!({
                "file_name": "Stored",
                "public_url": "https://old.example/stored.mp4",
                "file_path": "gs://media/stored.mp4"
            }),
        )
        .unwrap();

    let client = Arc::new(CatalogClient::new(&server).unwrap());

    let list_client = client.clone();
    let movies = blocking(move || list_client.movies()).await.unwrap();
    assert_eq!(movies.len(), 2);
    assert_eq!(movies[0].id, "yt");
    assert_eq!(
        movies[0].public_url(),
        "https://www.youtube.com/watch?v=dQw4w9WgXcQ"
    );
    assert_eq!(movies[0].extra["rating"], "PG");
    // Signing is disabled, so the stored URL survives.
    assert_eq!(movies[1].public_url(), "https://old.example/stored.mp4");

    let movie_client = client.clone();
    let movie = blocking(move || movie_client.movie("stored")).await.unwrap();
    assert_eq!(movie.file_name, "Stored");

    let search_client = client.clone();
    let output = blocking(move || search_client.search("night train")).await.unwrap();
    assert_eq!(output.summary, "Results for night train");
    assert_eq!(output.results[0].title, "Night Train");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_missing_query_is_a_bad_request() {
    let temp = tempfile::tempdir().unwrap();
    let (server, _store) = serve(&temp).await;

    let client = CatalogClient::new(&server).unwrap();
    let err = blocking(move || client.search("")).await.unwrap_err();
    match err {
        ClientError::Status { status, body } => {
            assert_eq!(status, 400);
            assert_eq!(body, "Query parameter \"q\" is required");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_health_check() {
    let temp = tempfile::tempdir().unwrap();
    let (server, _store) = serve(&temp).await;

    let body = blocking(move || {
        ureq::get(&format!("{server}/healthz"))
            .call()
            .unwrap()
            .into_string()
            .unwrap()
    })
    .await;
    assert_eq!(body, "ok");
}

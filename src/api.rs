//! HTTP surface of the backend.
//!
//! Every collaborator lives behind a trait object in [`AppState`], built once
//! by the binary and handed to the router; handlers never reach for globals.

use std::{
    path::{Component, Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use axum::{
    Json, Router,
    body::Body,
    extract::{Path as AxumPath, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use futures::future::join_all;
use mime_guess::MimeGuess;
use serde::Deserialize;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info, warn};

use crate::assistant::ChatModel;
use crate::catalog::{Asset, CatalogSource};
use crate::chat;
use crate::search::{SearchBackend, SearchOutput};
use crate::signing::{SIGNED_URL_TTL, StorageObject, UrlSigner};

#[derive(Debug, Clone)]
pub struct ApiSettings {
    pub collection: String,
    /// URLs under this prefix are already directly playable.
    pub public_storage_prefix: String,
    pub signed_url_ttl: Duration,
    /// Local directory backing `gs://` buckets for the storage route.
    pub storage_root: PathBuf,
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<dyn CatalogSource>,
    pub signer: Arc<dyn UrlSigner>,
    pub assistant: Arc<dyn ChatModel>,
    pub search: Arc<dyn SearchBackend>,
    pub settings: Arc<ApiSettings>,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

/// Errors leave as plain text; internal detail stays in the logs.
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, self.message).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/movies", get(list_movies))
        .route("/api/movies/{id}", get(get_movie))
        .route("/api/search", get(search))
        .route("/storage/{bucket}/{*object}", get(download_object))
        .route("/chat", get(chat::chat_socket))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

pub async fn list_movies(State(state): State<AppState>) -> ApiResult<Json<Vec<Asset>>> {
    let assets = state
        .catalog
        .list_assets(&state.settings.collection)
        .await
        .map_err(|err| {
            error!("Error fetching movies: {err}");
            ApiError::internal("Error fetching movies")
        })?;

    if assets.is_empty() {
        return Err(ApiError::not_found("No movies found"));
    }

    let resolved = join_all(
        assets
            .into_iter()
            .map(|asset| resolve_playback_url(asset, state.signer.as_ref(), &state.settings)),
    )
    .await;

    Ok(Json(resolved))
}

pub async fn get_movie(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
) -> ApiResult<Json<Asset>> {
    let asset = state
        .catalog
        .get_asset(&state.settings.collection, &id)
        .await
        .map_err(|err| {
            error!(%id, "Error fetching movie: {err}");
            ApiError::internal("Error fetching movie")
        })?
        .ok_or_else(|| ApiError::not_found("Movie not found"))?;

    let asset = resolve_playback_url(asset, state.signer.as_ref(), &state.settings).await;
    Ok(Json(asset))
}

/// Makes sure `public_url` is something a player can open.
///
/// External-platform assets borrow their `file_path` when no URL is stored.
/// Stored media without a direct public URL gets a short-lived signed URL;
/// if signing fails the stored value is kept.
pub async fn resolve_playback_url(
    mut asset: Asset,
    signer: &dyn UrlSigner,
    settings: &ApiSettings,
) -> Asset {
    if asset.is_external() {
        if asset.public_url.as_deref().is_none_or(str::is_empty) {
            if let Some(path) = asset.file_path.clone() {
                asset.public_url = Some(path);
            }
        }
        return asset;
    }

    let directly_playable = asset
        .public_url
        .as_deref()
        .is_some_and(|url| url.starts_with(&settings.public_storage_prefix));
    if directly_playable {
        return asset;
    }

    let Some(file_path) = asset
        .file_path
        .as_deref()
        .filter(|path| StorageObject::is_reference(path))
    else {
        return asset;
    };

    let signed = match StorageObject::parse(file_path) {
        Ok(object) => signer.sign_read(&object, settings.signed_url_ttl).await,
        Err(err) => Err(err),
    };
    match signed {
        Ok(url) => asset.public_url = Some(url),
        Err(err) => warn!("Error generating signed URL for {file_path}: {err}"),
    }
    asset
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<SearchOutput>> {
    let query = params
        .q
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("Query parameter \"q\" is required"))?;

    info!(%query, "Search query");
    let output = state.search.search(&query).await.map_err(|err| {
        error!("Error in search endpoint: {err}");
        ApiError::internal("Error performing search")
    })?;
    info!(results = output.results.len(), "Search query provided results");

    Ok(Json(output))
}

#[derive(Debug, Deserialize)]
pub struct SignedParams {
    pub expires: i64,
    pub signature: String,
}

pub async fn download_object(
    State(state): State<AppState>,
    AxumPath((bucket, object)): AxumPath<(String, String)>,
    Query(params): Query<SignedParams>,
) -> ApiResult<Response> {
    state
        .signer
        .verify(&bucket, &object, params.expires, &params.signature)
        .map_err(|err| {
            debug!(%bucket, %object, "rejected storage request: {err}");
            ApiError::forbidden("Access denied")
        })?;

    let path = storage_path(&state.settings.storage_root, &bucket, &object)
        .ok_or_else(|| ApiError::not_found("file not found"))?;
    stream_file(path).await
}

/// Maps a bucket/object pair below `root`, refusing anything that could
/// climb out of it.
fn storage_path(root: &Path, bucket: &str, object: &str) -> Option<PathBuf> {
    let relative = Path::new(bucket).join(object);
    let safe = relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)));
    safe.then(|| root.join(relative))
}

async fn stream_file(path: PathBuf) -> ApiResult<Response> {
    let file = File::open(&path)
        .await
        .map_err(|_| ApiError::not_found("file not found"))?;

    let stream = ReaderStream::new(file);
    let body = Body::from_stream(stream);
    let mut response = body.into_response();
    if let Some(mime) = MimeGuess::from_path(&path).first() {
        if let Ok(value) = mime.to_string().parse() {
            response.headers_mut().insert(header::CONTENT_TYPE, value);
        }
    }

    Ok(response)
}

//! Asset catalog persistence.
//!
//! Assets are schemaless documents grouped into named collections, the same
//! shape the enrichment pipeline writes. Each document is stored as JSON in a
//! single SQLite table keyed by `(collection, id)`; the typed [`Asset`] view
//! below is what the API and the playback helpers work with. Fields the
//! structs do not know about are kept in `extra` so nothing is lost on the way
//! through.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio::task;
use tracing::{debug, warn};

use crate::clips;
use crate::timecode::TimeValue;

/// Default collection name when the deployment does not configure one.
pub const DEFAULT_COLLECTION: &str = "media_assets";

/// `source` value for assets hosted on YouTube rather than in our storage.
pub const YOUTUBE_SOURCE: &str = "youtube";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("document {id} is not a valid asset: {source}")]
    Decode {
        id: String,
        source: serde_json::Error,
    },
    #[error("document {id} could not be serialized: {source}")]
    Encode {
        id: String,
        source: serde_json::Error,
    },
    #[error("catalog directory {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("catalog worker failed: {0}")]
    Worker(String),
}

/// Kind of programme. Values outside the known set are carried verbatim so
/// they survive a read/write cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ContentType {
    TvShow,
    Movie,
    Sports,
    Highlight,
    Other(String),
}

impl ContentType {
    pub fn as_str(&self) -> &str {
        match self {
            ContentType::TvShow => "tv_show",
            ContentType::Movie => "movie",
            ContentType::Sports => "sports",
            ContentType::Highlight => "highlight",
            ContentType::Other(other) => other,
        }
    }
}

impl From<String> for ContentType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "tv_show" => ContentType::TvShow,
            "movie" => ContentType::Movie,
            "sports" => ContentType::Sports,
            "highlight" => ContentType::Highlight,
            _ => ContentType::Other(value),
        }
    }
}

impl From<ContentType> for String {
    fn from(value: ContentType) -> Self {
        match value {
            ContentType::Other(other) => other,
            known => known.as_str().to_owned(),
        }
    }
}

/// Treats an explicit `null` like a missing field. Stored documents come from
/// several writers and not all of them omit empty values.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Character {
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Person {
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub person: String,
}

/// A labelled sub-range of the timeline (scene, ad break, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Section {
    #[serde(default, deserialize_with = "null_as_default")]
    pub start_time: TimeValue,
    #[serde(default, deserialize_with = "null_as_default")]
    pub end_time: TimeValue,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Section {
    /// Text shown in the description column: the reason, falling back to the
    /// summary.
    pub fn description(&self) -> &str {
        self.reason
            .as_deref()
            .filter(|reason| !reason.is_empty())
            .or(self.summary.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetSummary {
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub video_mood: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub subject_topics: Vec<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub character: Vec<Character>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub practice: Vec<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub subject: Vec<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub theme: Vec<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub people: Vec<Person>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub sections: Vec<Section>,
}

/// An AI-suggested short cut from the full asset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Clip {
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub user_description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub start_timecode: TimeValue,
    #[serde(default, deserialize_with = "null_as_default")]
    pub end_timecode: TimeValue,
    #[serde(default, deserialize_with = "null_as_default")]
    pub emotions_triggered: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Previews {
    #[serde(default, deserialize_with = "null_as_default")]
    pub clips: Vec<Clip>,
}

/// Protobuf-style duration as emitted by the speech pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WordOffset {
    #[serde(default, deserialize_with = "null_as_default")]
    pub seconds: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub nanos: i64,
}

impl WordOffset {
    pub fn as_seconds(&self) -> f64 {
        self.seconds as f64 + self.nanos as f64 / 1e9
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptionWord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub word: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub start_time: WordOffset,
    #[serde(default, deserialize_with = "null_as_default")]
    pub end_time: WordOffset,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Utterance {
    #[serde(default, deserialize_with = "null_as_default")]
    pub start: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub end: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub transcript: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcription {
    #[serde(default, deserialize_with = "null_as_default")]
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub utterances: Vec<Utterance>,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub words: Vec<TranscriptionWord>,
}

/// A catalogued video with its enrichment metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Asset {
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub file_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub poster_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    /// Storage reference (`gs://bucket/object`) or, for external sources, the
    /// upstream page URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: AssetSummary,
    #[serde(default, deserialize_with = "null_as_default")]
    pub previews: Previews,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<Transcription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(
        rename = "contentType",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content_type: Option<ContentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_dummy: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Asset {
    /// Hosted on an external video platform; playback goes through an embed.
    pub fn is_external(&self) -> bool {
        self.source.as_deref() == Some(YOUTUBE_SOURCE)
    }

    pub fn public_url(&self) -> &str {
        self.public_url.as_deref().unwrap_or("")
    }

    pub fn youtube_id(&self) -> Option<String> {
        clips::youtube_id(self.public_url())
    }

    pub fn sections(&self) -> &[Section] {
        &self.summary.sections
    }

    pub fn words(&self) -> &[TranscriptionWord] {
        self.transcription
            .as_ref()
            .map(|transcription| transcription.words.as_slice())
            .unwrap_or(&[])
    }
}

/// Read access to asset collections, as the HTTP layer sees it.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn list_assets(&self, collection: &str) -> Result<Vec<Asset>, CatalogError>;

    async fn get_asset(&self, collection: &str, id: &str) -> Result<Option<Asset>, CatalogError>;
}

/// Writable handle used by the importer and by tests to seed collections.
#[derive(Debug)]
pub struct CatalogStore {
    conn: Connection,
}

impl CatalogStore {
    /// Opens (and if necessary creates) the catalog database. WAL keeps the
    /// API's readers from blocking an import.
    pub fn open(path: &Path) -> Result<Self, CatalogError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CatalogError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self { conn };
        store.ensure_tables()?;
        Ok(store)
    }

    fn ensure_tables(&self) -> Result<(), CatalogError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                data_json TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );
            "#,
        )?;
        Ok(())
    }

    /// Inserts or replaces a raw document. The `id` key inside `data`, if any,
    /// is stored as part of the payload untouched.
    pub fn upsert_document(
        &self,
        collection: &str,
        id: &str,
        data: &Value,
    ) -> Result<(), CatalogError> {
        let data_json = serde_json::to_string(data).map_err(|source| CatalogError::Encode {
            id: id.to_owned(),
            source,
        })?;

        self.conn.execute(
            r#"
            INSERT INTO documents (collection, id, data_json, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(collection, id) DO UPDATE SET
                data_json = excluded.data_json,
                updated_at = excluded.updated_at
            "#,
            params![collection, id, data_json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn upsert_asset(&self, collection: &str, asset: &Asset) -> Result<(), CatalogError> {
        let mut data = serde_json::to_value(asset).map_err(|source| CatalogError::Encode {
            id: asset.id.clone(),
            source,
        })?;
        if let Value::Object(map) = &mut data {
            map.remove("id");
        }
        self.upsert_document(collection, &asset.id, &data)
    }

    pub fn delete_document(&self, collection: &str, id: &str) -> Result<bool, CatalogError> {
        let removed = self.conn.execute(
            "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
            params![collection, id],
        )?;
        Ok(removed > 0)
    }
}

/// Cloneable reader that opens a short-lived connection per query so it can
/// be moved onto blocking worker threads freely.
#[derive(Debug, Clone)]
pub struct CatalogReader {
    db_path: PathBuf,
}

impl CatalogReader {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            db_path: path.as_ref().to_path_buf(),
        }
    }

    /// Runs `f` against the catalog, or returns `empty` when nothing has been
    /// imported yet (no database file, or no documents table in it).
    fn with_connection<F, T>(&self, empty: T, f: F) -> Result<T, CatalogError>
    where
        F: FnOnce(&Connection) -> Result<T, CatalogError>,
    {
        if !self.db_path.exists() {
            debug!(path = %self.db_path.display(), "catalog database does not exist yet");
            return Ok(empty);
        }
        let conn = Connection::open(&self.db_path)?;
        let has_documents: bool = conn.query_row(
            "SELECT EXISTS (SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'documents')",
            [],
            |row| row.get(0),
        )?;
        if !has_documents {
            debug!(path = %self.db_path.display(), "catalog has no documents table yet");
            return Ok(empty);
        }
        f(&conn)
    }

    /// Lists a collection in insertion order. Documents that cannot be read as
    /// an asset are logged and left out so one bad record does not hide the
    /// rest.
    pub fn list_documents(&self, collection: &str) -> Result<Vec<Asset>, CatalogError> {
        self.with_connection(Vec::new(), |conn| {
            let mut stmt = conn.prepare(
                r#"
                SELECT id, data_json
                FROM documents
                WHERE collection = ?1
                ORDER BY rowid ASC
                "#,
            )?;

            let mut rows = stmt.query([collection])?;
            let mut assets = Vec::new();
            while let Some(row) = rows.next()? {
                let id: String = row.get(0)?;
                let data_json: String = row.get(1)?;
                match decode_asset(id, &data_json) {
                    Ok(asset) => assets.push(asset),
                    Err(err) => warn!(%collection, "skipping document: {err}"),
                }
            }
            Ok(assets)
        })
    }

    pub fn get_document(&self, collection: &str, id: &str) -> Result<Option<Asset>, CatalogError> {
        self.with_connection(None, |conn| {
            let data_json: Option<String> = conn
                .query_row(
                    "SELECT data_json FROM documents WHERE collection = ?1 AND id = ?2",
                    params![collection, id],
                    |row| row.get(0),
                )
                .optional()?;

            data_json
                .map(|json| decode_asset(id.to_owned(), &json))
                .transpose()
        })
    }
}

#[async_trait]
impl CatalogSource for CatalogReader {
    async fn list_assets(&self, collection: &str) -> Result<Vec<Asset>, CatalogError> {
        let reader = self.clone();
        let collection = collection.to_owned();
        task::spawn_blocking(move || reader.list_documents(&collection))
            .await
            .map_err(|err| CatalogError::Worker(err.to_string()))?
    }

    async fn get_asset(&self, collection: &str, id: &str) -> Result<Option<Asset>, CatalogError> {
        let reader = self.clone();
        let collection = collection.to_owned();
        let id = id.to_owned();
        task::spawn_blocking(move || reader.get_document(&collection, &id))
            .await
            .map_err(|err| CatalogError::Worker(err.to_string()))?
    }
}

/// Builds the API view of a stored document. A non-empty `id` inside the
/// stored fields wins over the row key.
fn decode_asset(id: String, data_json: &str) -> Result<Asset, CatalogError> {
    let decode_err = |id: &str, source| CatalogError::Decode {
        id: id.to_owned(),
        source,
    };

    let mut fields: Map<String, Value> =
        serde_json::from_str(data_json).map_err(|source| decode_err(&id, source))?;
    let has_own_id = matches!(fields.get("id"), Some(Value::String(own)) if !own.is_empty());
    if !has_own_id {
        fields.insert("id".to_owned(), Value::String(id.clone()));
    }
    serde_json::from_value(Value::Object(fields)).map_err(|source| decode_err(&id, source))
}

//! Time-limited read URLs for objects in private storage.
//!
//! Assets reference their media as `gs://bucket/object`. The backend hands out
//! URLs of the form `{base}/storage/{bucket}/{object}?expires=..&signature=..`
//! where the signature is a keyed BLAKE3 MAC over bucket, object and expiry;
//! the storage route recomputes it before streaming the file.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use thiserror::Error;
use url::Url;

pub const STORAGE_SCHEME: &str = "gs://";

/// Validity of URLs handed out in list responses.
pub const SIGNED_URL_TTL: Duration = Duration::from_secs(15 * 60);

const KEY_CONTEXT: &str = "reelview 2024 storage url signing";

#[derive(Debug, Error)]
pub enum SignError {
    #[error("url signing is not configured")]
    NotConfigured,
    #[error("not a storage reference: {0}")]
    InvalidReference(String),
    #[error("invalid public base url: {0}")]
    BaseUrl(#[from] url::ParseError),
    #[error("signed url has expired")]
    Expired,
    #[error("signature mismatch")]
    BadSignature,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageObject {
    pub bucket: String,
    pub name: String,
}

impl StorageObject {
    /// Parses `gs://bucket/path/to/object`. Both parts must be present.
    pub fn parse(reference: &str) -> Result<Self, SignError> {
        let invalid = || SignError::InvalidReference(reference.to_owned());
        let rest = reference.strip_prefix(STORAGE_SCHEME).ok_or_else(invalid)?;
        let (bucket, name) = rest.split_once('/').ok_or_else(invalid)?;
        if bucket.is_empty() || name.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            bucket: bucket.to_owned(),
            name: name.to_owned(),
        })
    }

    pub fn is_reference(value: &str) -> bool {
        value.starts_with(STORAGE_SCHEME)
    }
}

#[async_trait]
pub trait UrlSigner: Send + Sync {
    async fn sign_read(&self, object: &StorageObject, ttl: Duration) -> Result<String, SignError>;

    /// Checks a presented signature for `bucket/name` valid until `expires`
    /// (unix seconds).
    fn verify(
        &self,
        bucket: &str,
        name: &str,
        expires: i64,
        signature: &str,
    ) -> Result<(), SignError>;
}

pub struct LocalSigner {
    key: [u8; 32],
    base: Url,
}

impl LocalSigner {
    pub fn new(secret: &str, public_base_url: &str) -> Result<Self, SignError> {
        if secret.is_empty() {
            return Err(SignError::NotConfigured);
        }
        Ok(Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
            base: Url::parse(public_base_url)?,
        })
    }

    fn mac(&self, bucket: &str, name: &str, expires: i64) -> blake3::Hash {
        let mut hasher = blake3::Hasher::new_keyed(&self.key);
        hasher.update(bucket.as_bytes());
        hasher.update(b"\n");
        hasher.update(name.as_bytes());
        hasher.update(b"\n");
        hasher.update(expires.to_string().as_bytes());
        hasher.finalize()
    }

    pub fn signed_url_until(
        &self,
        object: &StorageObject,
        expires_at: DateTime<Utc>,
    ) -> Result<String, SignError> {
        let expires = expires_at.timestamp();
        let signature = URL_SAFE_NO_PAD.encode(self.mac(&object.bucket, &object.name, expires).as_bytes());

        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| SignError::BaseUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?;
            segments.pop_if_empty();
            segments.push("storage");
            segments.push(&object.bucket);
            segments.extend(object.name.split('/'));
        }
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);
        Ok(url.into())
    }

    pub fn verify_at(
        &self,
        bucket: &str,
        name: &str,
        expires: i64,
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<(), SignError> {
        let presented: [u8; 32] = URL_SAFE_NO_PAD
            .decode(signature)
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(SignError::BadSignature)?;
        // Hash equality is constant time.
        if self.mac(bucket, name, expires) != blake3::Hash::from(presented) {
            return Err(SignError::BadSignature);
        }
        if now.timestamp() > expires {
            return Err(SignError::Expired);
        }
        Ok(())
    }
}

#[async_trait]
impl UrlSigner for LocalSigner {
    async fn sign_read(&self, object: &StorageObject, ttl: Duration) -> Result<String, SignError> {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::zero());
        self.signed_url_until(object, Utc::now() + ttl)
    }

    fn verify(
        &self,
        bucket: &str,
        name: &str,
        expires: i64,
        signature: &str,
    ) -> Result<(), SignError> {
        self.verify_at(bucket, name, expires, signature, Utc::now())
    }
}

/// Stand-in when no signing secret is configured: every attempt fails, so
/// list responses keep the stored URLs and the storage route refuses access.
pub struct DisabledSigner;

#[async_trait]
impl UrlSigner for DisabledSigner {
    async fn sign_read(&self, _object: &StorageObject, _ttl: Duration) -> Result<String, SignError> {
        Err(SignError::NotConfigured)
    }

    fn verify(&self, _: &str, _: &str, _: i64, _: &str) -> Result<(), SignError> {
        Err(SignError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn signer() -> LocalSigner {
        LocalSigner::new("s3cret", "https://media.example/").unwrap()
    }

    fn query_value(url: &str, key: &str) -> String {
        Url::parse(url)
            .unwrap()
            .query_pairs()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.into_owned())
            .unwrap()
    }

    #[test]
    fn parses_storage_references() {
        let object = StorageObject::parse("gs://media/films/night train.mp4").unwrap();
        assert_eq!(object.bucket, "media");
        assert_eq!(object.name, "films/night train.mp4");
        assert!(StorageObject::parse("https://media/x").is_err());
        assert!(StorageObject::parse("gs://media").is_err());
        assert!(StorageObject::parse("gs:///x").is_err());
    }

    #[test]
    fn signed_urls_verify_until_expiry() {
        let signer = signer();
        let object = StorageObject::parse("gs://media/films/night train.mp4").unwrap();
        let expires_at = Utc.with_ymd_and_hms(2030, 1, 1, 12, 0, 0).unwrap();
        let url = signer.signed_url_until(&object, expires_at).unwrap();

        assert!(url.starts_with("https://media.example/storage/media/films/night%20train.mp4?"));
        let expires: i64 = query_value(&url, "expires").parse().unwrap();
        let signature = query_value(&url, "signature");
        assert_eq!(expires, expires_at.timestamp());

        let before = expires_at - chrono::Duration::minutes(1);
        signer
            .verify_at("media", "films/night train.mp4", expires, &signature, before)
            .unwrap();

        let after = expires_at + chrono::Duration::seconds(1);
        assert!(matches!(
            signer.verify_at("media", "films/night train.mp4", expires, &signature, after),
            Err(SignError::Expired)
        ));
    }

    #[test]
    fn tampering_is_rejected() {
        let signer = signer();
        let object = StorageObject::parse("gs://media/a.mp4").unwrap();
        let expires_at = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let url = signer.signed_url_until(&object, expires_at).unwrap();
        let signature = query_value(&url, "signature");
        let now = expires_at - chrono::Duration::minutes(5);

        let other_object = signer.verify_at("media", "b.mp4", expires_at.timestamp(), &signature, now);
        assert!(matches!(other_object, Err(SignError::BadSignature)));

        let extended = signer.verify_at("media", "a.mp4", expires_at.timestamp() + 3600, &signature, now);
        assert!(matches!(extended, Err(SignError::BadSignature)));

        let garbage = signer.verify_at("media", "a.mp4", expires_at.timestamp(), "not-base64!", now);
        assert!(matches!(garbage, Err(SignError::BadSignature)));

        let other_key = LocalSigner::new("different", "https://media.example/").unwrap();
        assert!(other_key
            .verify_at("media", "a.mp4", expires_at.timestamp(), &signature, now)
            .is_err());
    }

    #[test]
    fn base_url_paths_are_preserved() {
        let signer = LocalSigner::new("k", "https://cdn.example/reelview").unwrap();
        let object = StorageObject::parse("gs://b/o.mp4").unwrap();
        let url = signer
            .signed_url_until(&object, Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
            .unwrap();
        assert!(url.starts_with("https://cdn.example/reelview/storage/b/o.mp4?expires="));
    }

    #[tokio::test]
    async fn disabled_signer_refuses() {
        let object = StorageObject::parse("gs://b/o.mp4").unwrap();
        assert!(matches!(
            DisabledSigner.sign_read(&object, SIGNED_URL_TTL).await,
            Err(SignError::NotConfigured)
        ));
        assert!(LocalSigner::new("", "https://x.example").is_err());
    }
}

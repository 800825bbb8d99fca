use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::assistant::DEFAULT_MODEL;
use crate::catalog::DEFAULT_COLLECTION;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/reelview-env";
pub const CONFIG_PATH_VAR: &str = "REELVIEW_CONFIG";
pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_CATALOG_DB: &str = "/var/lib/reelview/catalog.db";
pub const DEFAULT_STORAGE_ROOT: &str = "/var/lib/reelview/storage";
pub const DEFAULT_PUBLIC_STORAGE_PREFIX: &str = "https://storage.googleapis.com/";

const KEYS: &[&str] = &[
    "REELVIEW_HOST",
    "REELVIEW_PORT",
    "CATALOG_DB",
    "CATALOG_COLLECTION",
    "STORAGE_ROOT",
    "PUBLIC_BASE_URL",
    "PUBLIC_STORAGE_PREFIX",
    "SIGNING_SECRET",
    "GENERATION_URL",
    "GENERATION_MODEL",
    "GENERATION_API_KEY",
    "SEARCH_URL",
    "SEARCH_API_KEY",
];

#[derive(Debug, Clone, Default)]
pub struct EnvConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub catalog_db: Option<PathBuf>,
    pub collection: Option<String>,
    pub storage_root: Option<PathBuf>,
    pub public_base_url: Option<String>,
    pub public_storage_prefix: Option<String>,
    pub signing_secret: Option<String>,
    pub generation_url: Option<String>,
    pub generation_model: Option<String>,
    pub generation_api_key: Option<String>,
    pub search_url: Option<String>,
    pub search_api_key: Option<String>,
}

/// Fully resolved settings the binaries run with.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub host: String,
    pub port: u16,
    pub catalog_db: PathBuf,
    pub collection: String,
    pub storage_root: PathBuf,
    pub public_base_url: String,
    pub public_storage_prefix: String,
    pub signing_secret: Option<String>,
    pub generation_url: Option<String>,
    pub generation_model: String,
    pub generation_api_key: Option<String>,
    pub search_url: Option<String>,
    pub search_api_key: Option<String>,
}

impl EnvConfig {
    /// Applies one `KEY=value` pair. Empty values leave the field unset.
    fn set(&mut self, key: &str, value: &str, origin: &str) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        let text = || Some(value.to_string());
        match key {
            "REELVIEW_HOST" => self.host = text(),
            "REELVIEW_PORT" => {
                let port: u16 = value
                    .parse()
                    .with_context(|| format!("Parsing REELVIEW_PORT from {origin}"))?;
                self.port = Some(port);
            }
            "CATALOG_DB" => self.catalog_db = Some(PathBuf::from(value)),
            "CATALOG_COLLECTION" => self.collection = text(),
            "STORAGE_ROOT" => self.storage_root = Some(PathBuf::from(value)),
            "PUBLIC_BASE_URL" => self.public_base_url = text(),
            "PUBLIC_STORAGE_PREFIX" => self.public_storage_prefix = text(),
            "SIGNING_SECRET" => self.signing_secret = text(),
            "GENERATION_URL" => self.generation_url = text(),
            "GENERATION_MODEL" => self.generation_model = text(),
            "GENERATION_API_KEY" => self.generation_api_key = text(),
            "SEARCH_URL" => self.search_url = text(),
            "SEARCH_API_KEY" => self.search_api_key = text(),
            _ => {}
        }
        Ok(())
    }

    /// Process variables take precedence over the file.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        for key in KEYS {
            if let Some(value) = lookup(key) {
                self.set(key, value.trim(), "environment")?;
            }
        }
        Ok(())
    }

    pub fn resolve(self) -> RuntimeConfig {
        let host = self.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = self.port.unwrap_or(DEFAULT_PORT);
        let public_base_url = self
            .public_base_url
            .unwrap_or_else(|| format!("http://{host}:{port}"));
        RuntimeConfig {
            catalog_db: self
                .catalog_db
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG_DB)),
            collection: self
                .collection
                .unwrap_or_else(|| DEFAULT_COLLECTION.to_string()),
            storage_root: self
                .storage_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STORAGE_ROOT)),
            public_storage_prefix: self
                .public_storage_prefix
                .unwrap_or_else(|| DEFAULT_PUBLIC_STORAGE_PREFIX.to_string()),
            signing_secret: self.signing_secret,
            generation_url: self.generation_url,
            generation_model: self
                .generation_model
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            generation_api_key: self.generation_api_key,
            search_url: self.search_url,
            search_api_key: self.search_api_key,
            host,
            port,
            public_base_url,
        }
    }
}

pub fn read_env_config(path: &Path) -> Result<Option<EnvConfig>> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))?;
    let origin = path.display().to_string();
    let mut cfg = EnvConfig::default();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value_raw)) = trimmed.split_once('=') {
            let value = value_raw.trim().trim_matches('"');
            cfg.set(key.trim(), value, &origin)?;
        }
    }
    Ok(Some(cfg))
}

/// Loads `$REELVIEW_CONFIG` (or the default path) and overlays the process
/// environment. A missing file is fine; everything has a default or is
/// optional.
pub fn load_runtime_config(explicit: Option<&Path>) -> Result<RuntimeConfig> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_PATH_VAR).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    load_runtime_config_from(&path, |key| std::env::var(key).ok())
}

pub fn load_runtime_config_from<F>(path: &Path, lookup: F) -> Result<RuntimeConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut cfg = read_env_config(path)?.unwrap_or_default();
    cfg.apply_overrides(lookup)?;
    Ok(cfg.resolve())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn make_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "{}", contents).unwrap();
        file
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn read_env_config_extracts_port_and_collection() {
        let cfg = make_config(
            "# catalog\nREELVIEW_PORT=\"4242\"\nCATALOG_COLLECTION=\"festival\"\n",
        );
        let parsed = read_env_config(cfg.path()).unwrap().unwrap();
        assert_eq!(parsed.port, Some(4242));
        assert_eq!(parsed.collection.as_deref(), Some("festival"));
    }

    #[test]
    fn defaults_fill_missing_values() {
        let cfg = make_config("SIGNING_SECRET=\"\"\n");
        let runtime = load_runtime_config_from(cfg.path(), no_env).unwrap();
        assert_eq!(runtime.port, DEFAULT_PORT);
        assert_eq!(runtime.host, DEFAULT_HOST);
        assert_eq!(runtime.collection, DEFAULT_COLLECTION);
        assert_eq!(runtime.generation_model, DEFAULT_MODEL);
        assert_eq!(runtime.public_base_url, "http://127.0.0.1:3001");
        assert_eq!(runtime.public_storage_prefix, DEFAULT_PUBLIC_STORAGE_PREFIX);
        assert!(runtime.signing_secret.is_none());
        assert!(runtime.search_url.is_none());
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let runtime =
            load_runtime_config_from(Path::new("/nonexistent/reelview-env"), no_env).unwrap();
        assert_eq!(runtime.catalog_db, PathBuf::from(DEFAULT_CATALOG_DB));
    }

    #[test]
    fn environment_overrides_file() {
        let cfg = make_config("REELVIEW_HOST=\"10.0.0.5\"\nSEARCH_URL=\"https://search.example\"\n");
        let env: HashMap<&str, &str> = [("REELVIEW_HOST", "0.0.0.0"), ("REELVIEW_PORT", "8088")]
            .into_iter()
            .collect();
        let runtime =
            load_runtime_config_from(cfg.path(), |key| env.get(key).map(|v| v.to_string())).unwrap();
        assert_eq!(runtime.host, "0.0.0.0");
        assert_eq!(runtime.port, 8088);
        assert_eq!(runtime.search_url.as_deref(), Some("https://search.example"));
    }

    #[test]
    fn invalid_port_is_reported() {
        let cfg = make_config("REELVIEW_PORT=\"eighty\"\n");
        let err = read_env_config(cfg.path()).unwrap_err();
        assert!(err.to_string().contains("REELVIEW_PORT"));
    }
}

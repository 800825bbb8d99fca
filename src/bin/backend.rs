use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use reelview::{
    api::{self, ApiSettings, AppState},
    assistant::GenerativeClient,
    catalog::{CatalogReader, CatalogStore},
    config::{RuntimeConfig, load_runtime_config},
    search::SearchClient,
    signing::{DisabledSigner, LocalSigner, SIGNED_URL_TTL, UrlSigner},
};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Serve the reelview catalog API")]
struct Args {
    /// Env-style config file (defaults to $REELVIEW_CONFIG or /etc/reelview-env)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    host: Option<String>,
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = load_runtime_config(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(port) = args.port {
        config.port = port;
    }

    let state = build_state(&config)?;
    let app = api::router(state);

    let addr = SocketAddr::new(
        config
            .host
            .parse()
            .with_context(|| format!("parsing host {}", config.host))?,
        config.port,
    );
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {}", addr))?;
    info!("API server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    Ok(())
}

fn build_state(config: &RuntimeConfig) -> Result<AppState> {
    let signer: Arc<dyn UrlSigner> = match config.signing_secret.as_deref() {
        Some(secret) => Arc::new(
            LocalSigner::new(secret, &config.public_base_url)
                .context("initializing url signer")?,
        ),
        None => {
            warn!("SIGNING_SECRET is not set; storage URLs will not be signed");
            Arc::new(DisabledSigner)
        }
    };
    if config.generation_url.is_none() {
        warn!("GENERATION_URL is not set; chat requests will fail");
    }
    if config.search_url.is_none() {
        warn!("SEARCH_URL is not set; search requests will fail");
    }

    // Creates the schema on a fresh deployment; the reader opens its own
    // connections per query.
    CatalogStore::open(&config.catalog_db)
        .with_context(|| format!("opening catalog {}", config.catalog_db.display()))?;
    info!(
        db = %config.catalog_db.display(),
        collection = %config.collection,
        "using catalog"
    );

    Ok(AppState {
        catalog: Arc::new(CatalogReader::new(&config.catalog_db)),
        signer,
        assistant: Arc::new(GenerativeClient::new(
            config.generation_url.clone(),
            config.generation_model.clone(),
            config.generation_api_key.clone(),
        )),
        search: Arc::new(SearchClient::new(
            config.search_url.clone(),
            config.search_api_key.clone(),
        )),
        settings: Arc::new(ApiSettings {
            collection: config.collection.clone(),
            public_storage_prefix: config.public_storage_prefix.clone(),
            signed_url_ttl: SIGNED_URL_TTL,
            storage_root: config.storage_root.clone(),
        }),
    })
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!("Failed to install Ctrl+C handler: {}", err);
    }
}

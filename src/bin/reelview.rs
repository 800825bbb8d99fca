use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use reelview::{
    assistant::{ChatModel, ChatRequest, GenerativeClient},
    catalog::{Asset, CatalogStore},
    chapters::{ChapterFilter, chapter_rows, chapter_types, display_type},
    client::CatalogClient,
    clips::shorts_for,
    config::{RuntimeConfig, load_runtime_config},
    timecode::format_short,
    transcript,
};
use serde_json::Value;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(author, version, about = "Manage and browse a reelview catalog.")]
struct Cli {
    #[arg(long = "config", value_name = "PATH", help = "Path to the env-style config file")]
    config: Option<PathBuf>,
    #[arg(
        long = "server",
        value_name = "URL",
        help = "Backend to query (defaults to the configured host and port)"
    )]
    server: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Load every `*.json` document below a directory into the catalog database
    Import {
        dir: PathBuf,
        #[arg(long, value_name = "NAME", help = "Target collection")]
        collection: Option<String>,
    },
    /// Ask the media assistant a question
    Ask { question: String },
    #[command(flatten)]
    Browse(BrowseCommand),
}

/// Commands answered by a running backend.
#[derive(Subcommand, Debug)]
enum BrowseCommand {
    /// List catalog assets
    Movies,
    /// Search the catalog
    Search { query: String },
    /// Print the chapters of an asset
    Chapters {
        id: String,
        #[arg(long = "type", value_name = "TYPE")]
        kind: Option<String>,
        #[arg(long, default_value = "")]
        query: String,
    },
    /// Print transcript words matching a query, with their offsets
    Transcript { id: String, query: String },
    /// Print the shorts derived from an asset's preview clips
    Clips { id: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_runtime_config(cli.config.as_deref())?;

    match cli.command {
        Command::Import { dir, collection } => {
            let collection = collection.unwrap_or_else(|| config.collection.clone());
            import_documents(&config.catalog_db, &collection, &dir)
        }
        Command::Ask { question } => ask(&config, question),
        Command::Browse(command) => {
            let server = cli
                .server
                .unwrap_or_else(|| format!("http://{}:{}", config.host, config.port));
            let client = CatalogClient::new(&server)?;
            browse(&client, command)
        }
    }
}

fn browse(client: &CatalogClient, command: BrowseCommand) -> Result<()> {
    match command {
        BrowseCommand::Movies => {
            for asset in client.movies()? {
                println!("{}\t{}\t{}", asset.id, asset.file_name, asset.public_url());
            }
        }
        BrowseCommand::Search { query } => {
            let output = client.search(&query)?;
            if !output.summary.is_empty() {
                println!("{}", output.summary);
                println!();
            }
            for hit in output.results {
                println!("{}\n  {}", hit.title, hit.url);
                if let Some(snippet) = hit.snippet {
                    println!("  {}", snippet);
                }
            }
        }
        BrowseCommand::Chapters { id, kind, query } => {
            let asset = client.movie(&id)?;
            print_chapters(&asset, ChapterFilter { kind, query });
        }
        BrowseCommand::Transcript { id, query } => {
            let asset = client.movie(&id)?;
            let found = transcript::matches(asset.words(), &query);
            if found.is_empty() {
                println!("No words matching \"{}\"", query);
            }
            for word in found {
                println!("{}\t{}", word.label(), word.word);
            }
        }
        BrowseCommand::Clips { id } => {
            let asset = client.movie(&id)?;
            for short in shorts_for(&asset) {
                println!(
                    "{}\t{}-{}\t{}",
                    short.id,
                    format_short(&short.start_time),
                    format_short(&short.end_time),
                    short.title
                );
            }
        }
    }
    Ok(())
}

fn print_chapters(asset: &Asset, filter: ChapterFilter) {
    let sections = asset.sections();
    let types: Vec<String> = chapter_types(sections)
        .iter()
        .map(|kind| display_type(kind))
        .collect();
    if !types.is_empty() {
        println!("Types: {}", types.join(", "));
    }
    for row in chapter_rows(sections, &filter) {
        println!(
            "{:>3}  {} - {}  [{}]  {}",
            row.index, row.start, row.end, row.kind, row.description
        );
    }
}

fn ask(config: &RuntimeConfig, question: String) -> Result<()> {
    let client = GenerativeClient::new(
        config.generation_url.clone(),
        config.generation_model.clone(),
        config.generation_api_key.clone(),
    );
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("starting runtime")?;
    let reply = runtime.block_on(client.answer(&ChatRequest {
        query: question,
        history: Vec::new(),
    }))?;
    println!("{}", reply.answer);
    Ok(())
}

fn import_documents(db_path: &Path, collection: &str, root: &Path) -> Result<()> {
    if !root.is_dir() {
        bail!("{} is not a directory", root.display());
    }
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = CatalogStore::open(db_path)?;

    let mut imported = 0usize;
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
    {
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let documents = match read_documents(path) {
            Ok(documents) => documents,
            Err(err) => {
                warn!("skipping {}: {:#}", path.display(), err);
                continue;
            }
        };
        for (id, document) in documents {
            store.upsert_document(collection, &id, &document)?;
            imported += 1;
        }
    }

    println!("Imported {} documents into {}", imported, collection);
    Ok(())
}

/// A file holds one document or an array of them. Ids come from the `id`
/// field, falling back to the file stem (suffixed with the position for
/// arrays).
fn read_documents(path: &Path) -> Result<Vec<(String, Value)>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let value: Value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("parsing {}", path.display()))?;
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default();

    let documents = match value {
        Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| keyed_document(item, || format!("{}-{}", stem, index)))
            .collect::<Result<Vec<_>>>()?,
        other => vec![keyed_document(other, || stem.clone())?],
    };
    Ok(documents)
}

fn keyed_document(
    mut document: Value,
    fallback_id: impl FnOnce() -> String,
) -> Result<(String, Value)> {
    let Value::Object(map) = &mut document else {
        bail!("expected a JSON object");
    };
    let id = match map.remove("id") {
        Some(Value::String(id)) if !id.is_empty() => id,
        Some(Value::Number(id)) => id.to_string(),
        _ => fallback_id(),
    };
    Ok((id, document))
}

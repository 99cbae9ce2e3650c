use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use serde::Deserialize;

mod cli;
mod config;
mod search;
#[cfg(test)]
mod tests;

use config::Config;
use search::{
    model_id_hash, CatalogEntry, Embedder, EmbeddingRecord, FastEmbedder, SearchOptions,
    SearchService, VectorStorage,
};

/// One row of the catalog CSV consumed by `index`.
#[derive(Debug, Deserialize)]
struct CatalogRow {
    id: u64,
    code: String,
    description: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = cli::Args::parse();
    let config = Config::load_with(&args.data_dir)?;

    match args.command {
        cli::Command::Index { catalog } => run_index(&config, &catalog),
        cli::Command::Search {
            description,
            top_k,
            max_distance,
        } => run_search(&config, &description, top_k, max_distance),
        cli::Command::Stats {} => run_stats(&config),
    }
}

/// Offline embedding job: read the catalog, embed every description in one
/// batch, and atomically replace the vector index.
fn run_index(config: &Config, catalog_path: &std::path::Path) -> anyhow::Result<()> {
    let entries = read_catalog(catalog_path)?;
    if entries.is_empty() {
        bail!("catalog {} contains no rows", catalog_path.display());
    }
    log::info!("read {} catalog entries", entries.len());

    let embedder = open_embedder(config)?;

    let descriptions: Vec<String> = entries.iter().map(|e| e.description.clone()).collect();
    let vectors = embedder
        .embed_batch(&descriptions)
        .context("failed to embed catalog descriptions")?;
    log::info!("generated {} embeddings", vectors.len());

    let records: Vec<EmbeddingRecord> = entries
        .into_iter()
        .zip(vectors)
        .map(|(entry, vector)| EmbeddingRecord { entry, vector })
        .collect();

    let storage = VectorStorage::new(config.vectors_path());
    storage.save(&records, &embedder.model_id())?;

    println!(
        "indexed {} products ({} dimensions) into {}",
        records.len(),
        embedder.dimensions(),
        storage.path().display()
    );
    Ok(())
}

fn run_search(
    config: &Config,
    description: &str,
    top_k: Option<usize>,
    max_distance: Option<f64>,
) -> anyhow::Result<()> {
    let store = load_store(config)?;
    let embedder = open_embedder(config)?;

    let options = SearchOptions {
        top_k: top_k.unwrap_or(config.engine.top_k),
        max_distance: max_distance.unwrap_or(config.engine.max_distance),
        correction_cutoff: config.engine.correction_cutoff,
    };
    let service = SearchService::new(Box::new(embedder), Arc::new(store), options);

    let result = service.search(description);
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn run_stats(config: &Config) -> anyhow::Result<()> {
    let store = load_store(config)?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "path": config.vectors_path(),
            "entries": store.size(),
            "dimensionality": store.dimensionality(),
            "model": config.engine.model,
        }))?
    );
    Ok(())
}

fn read_catalog(path: &std::path::Path) -> anyhow::Result<Vec<CatalogEntry>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open catalog {}", path.display()))?;

    let mut entries = Vec::new();
    for row in reader.deserialize() {
        let row: CatalogRow = row.context("malformed catalog row")?;
        entries.push(CatalogEntry {
            id: row.id,
            code: row.code,
            description: row.description,
        });
    }
    Ok(entries)
}

fn load_store(config: &Config) -> anyhow::Result<search::ProductStore> {
    let storage = VectorStorage::new(config.vectors_path());
    if !storage.exists() {
        bail!(
            "no vector index at {}; run `prodmatch index --catalog <csv>` first",
            storage.path().display()
        );
    }
    let store = storage.load(&model_id_hash(&config.engine.model))?;
    log::info!(
        "loaded {} product embeddings ({} dimensions)",
        store.size(),
        store.dimensionality()
    );
    Ok(store)
}

fn open_embedder(config: &Config) -> anyhow::Result<FastEmbedder> {
    FastEmbedder::new(
        &config.engine.model,
        config.base_path().to_path_buf(),
        Some(Duration::from_secs(config.engine.download_timeout_secs)),
    )
    .with_context(|| format!("failed to initialize embedding model {}", config.engine.model))
}

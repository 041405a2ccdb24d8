//! CLI command implementations.

pub mod config;
pub mod index;
pub mod ingest;
pub mod init;
pub mod metadata;
pub mod progress;
pub mod status;
pub mod tag;

use anyhow::{Context, Result};
use castindex_config::{AppPaths, Config};
use castindex_db::Database;
use castindex_index::{open_index, CollectionSchema, IndexWriter};
use castindex_ingest::{open_progress_store, ProgressStore};
use std::io::{self, BufRead, Write};

/// Get the application paths.
pub fn get_paths() -> Result<AppPaths> {
    AppPaths::new().context("Failed to determine application directories")
}

/// Load the config file with environment overrides applied.
pub fn load_config() -> Result<Config> {
    Config::load().context("Failed to load configuration")
}

/// Open the metadata database, ensuring castindex is initialized.
pub fn get_database(config: &Config, paths: &AppPaths) -> Result<Database> {
    let path = config.metadata_database(paths);
    if !path.exists() {
        anyhow::bail!("Metadata database not found. Run 'castindex init' first.");
    }
    Database::open(&path).context("Failed to open metadata database")
}

/// Index writer for the configured backend and collection.
pub fn open_writer(config: &Config, paths: &AppPaths) -> Result<IndexWriter> {
    let index = open_index(&config.index, &config.index_file(paths))
        .context("Failed to connect to vector index")?;
    let schema = CollectionSchema::from_config(&config.index, config.embedding.dimension)
        .context("Invalid collection schema")?;
    Ok(IndexWriter::new(index, schema, config.index.batch_size).with_retry(config.retry.policy()))
}

pub fn open_progress(config: &Config, paths: &AppPaths) -> Result<Box<dyn ProgressStore>> {
    open_progress_store(&config.progress_file(paths), &config.output.progress_format)
        .context("Failed to open progress store")
}

/// Ask for a yes/no answer on stdin.
pub fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

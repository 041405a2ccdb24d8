//! Metadata store commands.

use super::{get_database, get_paths, load_config};
use anyhow::{Context, Result};
use castindex_db::MetadataImport;
use castindex_ingest::{MetadataMapper, ParsedFilename};
use colored::Colorize;
use std::path::Path;

pub fn import(file: &Path) -> Result<()> {
    let config = load_config()?;
    let paths = get_paths()?;
    let db = get_database(&config, &paths)?;

    let import = MetadataImport::from_json_file(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let (shows, episodes) = db
        .import_metadata(&import)
        .context("Failed to import metadata")?;

    println!(
        "{} Imported {} show(s) and {} episode(s)",
        "✓".green(),
        shows,
        episodes
    );
    Ok(())
}

pub fn resolve(filename: &str, group: Option<String>) -> Result<()> {
    let config = load_config()?;
    let paths = get_paths()?;
    let db = get_database(&config, &paths)?;

    match ParsedFilename::parse(filename) {
        Some(parsed) => {
            println!("{}", "Parsed Filename".cyan().bold());
            println!("  Show ref: {}", parsed.show_ref);
            if let Some(show_id) = parsed.show_id {
                println!("  Show id:  {}", show_id);
            }
            if let Some(episode) = parsed.episode_number {
                println!("  Episode:  {}", episode);
            }
            println!("  Title:    {}", parsed.episode_title);
        }
        None => println!("{} filename did not parse", "✗".red()),
    }

    let mut mapper = MetadataMapper::new(db, config.metadata.title_similarity);
    let metadata = mapper.resolve(filename, group.as_deref())?;

    println!();
    println!("{}", "Episode Metadata".cyan().bold());
    println!("{}", serde_json::to_string_pretty(&metadata)?);
    Ok(())
}

//! Vector index lifecycle commands.

use super::{confirm, get_paths, load_config, open_writer};
use anyhow::{Context, Result};
use colored::Colorize;

pub fn create() -> Result<()> {
    let config = load_config()?;
    let mut writer = open_writer(&config, &get_paths()?)?;

    let name = writer.schema().name.clone();
    if writer.ensure_collection().context("Failed to create collection")? {
        println!("{} Created collection {}", "✓".green(), name.cyan());
    } else {
        println!("{} Collection {} already exists", "Note:".yellow().bold(), name.cyan());
    }
    Ok(())
}

pub fn drop_collection(yes: bool) -> Result<()> {
    let config = load_config()?;
    let mut writer = open_writer(&config, &get_paths()?)?;
    let name = writer.schema().name.clone();

    if !yes && !confirm(&format!("Drop collection {} and all its records?", name))? {
        println!("Aborted.");
        return Ok(());
    }
    writer.drop_collection().context("Failed to drop collection")?;
    println!("{} Dropped collection {}", "✓".green(), name.cyan());
    Ok(())
}

pub fn clear(yes: bool) -> Result<()> {
    let config = load_config()?;
    let mut writer = open_writer(&config, &get_paths()?)?;
    let name = writer.schema().name.clone();

    if !yes && !confirm(&format!("Delete every record in {}?", name))? {
        println!("Aborted.");
        return Ok(());
    }
    writer.clear().context("Failed to clear collection")?;
    println!("{} Cleared collection {}", "✓".green(), name.cyan());
    Ok(())
}

pub fn load() -> Result<()> {
    let config = load_config()?;
    let mut writer = open_writer(&config, &get_paths()?)?;
    writer.load().context("Failed to load collection")?;
    println!("{} Loaded collection {}", "✓".green(), writer.schema().name.cyan());
    Ok(())
}

pub fn stats() -> Result<()> {
    let config = load_config()?;
    let writer = open_writer(&config, &get_paths()?)?;
    let stats = writer.stats().context("Failed to read index statistics")?;

    println!("{}", "Vector Index".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("  Backend:    {}", stats.backend);
    println!("  Collection: {}", stats.collection);
    println!(
        "  Exists:     {}",
        if stats.exists { "yes".green() } else { "no".red() }
    );
    println!("  Rows:       {}", stats.row_count);
    println!("  Dimension:  {}", config.embedding.dimension);
    println!("  Model:      {}", config.embedding.model);
    Ok(())
}

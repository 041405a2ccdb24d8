//! Initialize castindex.

use super::get_paths;
use anyhow::{Context, Result};
use castindex_config::Config;
use castindex_db::Database;
use colored::Colorize;

pub fn run() -> Result<()> {
    let paths = get_paths()?;

    if paths.is_initialized() {
        println!("{} castindex is already initialized.", "Note:".yellow().bold());
        println!("  Config: {}", paths.config_file.display());
        println!("  Database: {}", paths.database_file.display());
        return Ok(());
    }

    println!("{}", "Initializing castindex...".cyan().bold());

    paths.ensure_dirs().context("Failed to create directories")?;
    println!("  {} Created directories", "✓".green());

    if !paths.config_file.exists() {
        Config::create_default_file(&paths.config_file).context("Failed to create config file")?;
    }
    println!("  {} Config: {}", "✓".green(), paths.config_file.display());

    let config = Config::load_from(&paths.config_file).context("Failed to read config file")?;
    let db_path = config.metadata_database(&paths);
    Database::open(&db_path).context("Failed to initialize metadata database")?;
    println!("  {} Metadata database: {}", "✓".green(), db_path.display());

    println!();
    println!("{}", "castindex initialized successfully!".green().bold());
    println!();
    println!("Next steps:");
    println!(
        "  1. Point at your transcripts: {}",
        "castindex config set source.root ~/transcripts".cyan()
    );
    println!(
        "  2. Import show/episode metadata: {}",
        "castindex metadata import metadata.json".cyan()
    );
    println!("  3. Run the pipeline: {}", "castindex ingest".cyan());

    Ok(())
}

//! Status command - metadata, progress, embedding and index health.

use super::progress::counts_by_group;
use super::{get_database, get_paths, load_config, open_progress, open_writer};
use anyhow::Result;
use castindex_embed::OllamaEmbedder;
use colored::Colorize;

pub fn run() -> Result<()> {
    let config = load_config()?;
    let paths = get_paths()?;

    println!("{}", "castindex Status".cyan().bold());
    println!("{}", "─".repeat(50));

    println!();
    println!("{}", "Metadata Store".white().bold());
    match get_database(&config, &paths).and_then(|db| Ok(db.metadata_stats()?)) {
        Ok(stats) => {
            println!("  Shows:    {}", stats.shows);
            println!("  Episodes: {}", stats.episodes);
            if stats.incomplete_episodes > 0 {
                println!(
                    "  {} {} episode(s) with incomplete metadata",
                    "!".yellow(),
                    stats.incomplete_episodes
                );
            }
        }
        Err(e) => println!("  {} {:#}", "✗".red(), e),
    }

    println!();
    println!("{}", "Progress".white().bold());
    let store = open_progress(&config, &paths)?;
    let progress = store.progress();
    println!("  Processed: {}", progress.processed_ids.len());
    for (group, count) in counts_by_group(progress) {
        println!("  {} {}: {}", "•".cyan(), group, count);
    }

    println!();
    println!("{}", "Embedding Server".white().bold());
    println!("  Host:  {}", config.embedding.host);
    println!("  Model: {} ({} dims)", config.embedding.model, config.embedding.dimension);
    match OllamaEmbedder::from_config(&config.embedding).and_then(|e| e.check()) {
        Ok(()) => println!("  {} ready", "●".green()),
        Err(e) => println!("  {} {}", "○".yellow(), e),
    }

    println!();
    println!("{}", "Vector Index".white().bold());
    match open_writer(&config, &paths).and_then(|w| Ok(w.stats()?)) {
        Ok(stats) => {
            println!("  Backend:    {}", stats.backend);
            println!("  Collection: {}", stats.collection);
            if stats.exists {
                println!("  Rows:       {}", stats.row_count);
            } else {
                println!(
                    "  {}",
                    "Collection not created. Run 'castindex index create'.".dimmed()
                );
            }
        }
        Err(e) => println!("  {} {:#}", "✗".red(), e),
    }

    Ok(())
}

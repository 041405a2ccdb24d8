//! Run the layered tag extractor on ad-hoc text.

use super::load_config;
use anyhow::{Context, Result};
use castindex_ingest::TagExtractor;
use colored::Colorize;

pub fn run(text: &str) -> Result<()> {
    let config = load_config()?;
    let extractor =
        TagExtractor::from_config(&config.tagging).context("Failed to load tag tables")?;
    let result = extractor.extract(text);

    println!("{}", "Tags".cyan().bold());
    println!("{}", "─".repeat(50));
    for tag in &result.tags {
        println!("  {} {}", "•".yellow(), tag.white());
    }
    println!();
    println!("  Strategy:   {}", result.strategy);
    println!(
        "  Confidence: {:.2} (threshold {:.2})",
        result.confidence,
        extractor.threshold()
    );
    println!("  Time:       {:.2} ms", result.elapsed_ms);
    Ok(())
}

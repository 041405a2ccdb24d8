//! Progress inspection and reset.

use super::{confirm, get_paths, load_config, open_progress};
use anyhow::Result;
use castindex_core::ProcessingProgress;
use colored::Colorize;
use std::collections::BTreeMap;

/// Processed document counts keyed by group.
pub(crate) fn counts_by_group(progress: &ProcessingProgress) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for id in &progress.processed_ids {
        let group = id.split_once('/').map_or(id.as_str(), |(group, _)| group);
        *counts.entry(group).or_insert(0) += 1;
    }
    counts
}

pub fn show() -> Result<()> {
    let config = load_config()?;
    let paths = get_paths()?;
    let store = open_progress(&config, &paths)?;
    let progress = store.progress();

    println!("{}", "Processing Progress".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("  File:      {}", store.path().display());
    println!("  Processed: {}", progress.processed_ids.len());
    println!(
        "  Updated:   {}",
        progress.last_updated.format("%Y-%m-%d %H:%M:%S")
    );

    let counts = counts_by_group(progress);
    if counts.is_empty() {
        println!();
        println!("{}", "No documents processed yet. Run 'castindex ingest'.".dimmed());
        return Ok(());
    }

    println!();
    println!("{}", "By Group".white().bold());
    for (group, count) in counts {
        println!("  {} {}: {}", "•".cyan(), group, count);
    }
    Ok(())
}

pub fn reset(group: Option<String>) -> Result<()> {
    let config = load_config()?;
    let paths = get_paths()?;
    let mut store = open_progress(&config, &paths)?;

    match group {
        Some(group) => {
            let removed = store.reset_group(&group)?;
            println!(
                "{} Reset {} document(s) in group {}",
                "✓".green(),
                removed,
                group.cyan()
            );
        }
        None => {
            let total = store.progress().processed_ids.len();
            if !confirm(&format!("Forget all {} processed documents?", total))? {
                println!("Aborted.");
                return Ok(());
            }
            store.reset_all()?;
            println!("{} Reset all progress", "✓".green());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_by_group() {
        let mut progress = ProcessingProgress::default();
        progress.mark("money/1");
        progress.mark("money/2");
        progress.mark("tech/1");
        progress.mark("orphan");

        let counts = counts_by_group(&progress);
        assert_eq!(counts["money"], 2);
        assert_eq!(counts["tech"], 1);
        assert_eq!(counts["orphan"], 1);
    }
}

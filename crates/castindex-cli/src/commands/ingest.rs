//! Ingest command: run the indexing pipeline.

use super::{get_paths, load_config};
use anyhow::{Context, Result};
use castindex_ingest::{GroupStats, Pipeline, PipelineComponents, PipelineObserver};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;

/// Drives an indicatif bar from pipeline events.
struct BarObserver {
    bar: ProgressBar,
}

impl PipelineObserver for BarObserver {
    fn group_started(&mut self, group: &str, pending: usize) {
        self.bar.reset();
        self.bar.set_length(pending as u64);
        self.bar.set_prefix(group.to_string());
    }

    fn document_finished(&mut self, _group: &str, source_id: &str, succeeded: bool) {
        if !succeeded {
            self.bar
                .println(format!("  {} {}", "✗".red(), source_id));
        }
        self.bar.set_message(source_id.to_string());
        self.bar.inc(1);
    }

    fn group_finished(&mut self, group: &str, stats: &GroupStats) {
        self.bar.println(format!(
            "  {} {}: {} ok, {} failed, {} skipped, {} chunks",
            "•".cyan(),
            group.white().bold(),
            stats.succeeded,
            stats.failed,
            stats.skipped,
            stats.chunks_written
        ));
    }
}

pub fn run(groups: Vec<String>, limit: Option<usize>) -> Result<()> {
    let config = load_config()?;
    let paths = get_paths()?;

    let groups = if groups.is_empty() {
        config.source.groups.clone()
    } else {
        groups
    };
    let limit = limit.or(config.source.row_limit);
    debug!("Groups: {:?}, limit: {:?}", groups, limit);

    let components = PipelineComponents::from_config(&config, &paths)
        .context("Failed to set up pipeline")?;

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let scope = if groups.is_empty() {
        "all groups".to_string()
    } else {
        format!("{} group(s)", groups.len())
    };
    println!(
        "{} {} from {}",
        "Indexing".cyan().bold(),
        scope,
        config.source_root().display()
    );

    let mut pipeline = Pipeline::new(components, limit)
        .with_observer(Box::new(BarObserver { bar: bar.clone() }));
    let summary = pipeline.run(&groups).context("Pipeline run failed")?;
    bar.finish_and_clear();

    let totals = &summary.totals;
    println!();
    println!("{}", "Run Summary".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("  Attempted:      {}", totals.attempted);
    println!("  {} {}", "Succeeded:     ".green(), totals.succeeded);
    if totals.failed > 0 {
        println!("  {} {}", "Failed:        ".red(), totals.failed);
    }
    println!("  Skipped:        {}", totals.skipped);
    println!("  Chunks written: {}", totals.chunks_written);
    println!("  Tags assigned:  {}", totals.tags_assigned);
    println!("  Elapsed:        {:.1}s", summary.elapsed.as_secs_f64());

    if summary.errors.total > 0 {
        println!();
        println!("{}", "Errors".red().bold());
        for (kind, count) in &summary.errors.by_kind {
            println!("  {}: {}", kind, count);
        }
        if let Some(export) = &summary.export {
            println!("  JSON: {}", export.json_path.display());
            println!("  CSV:  {}", export.csv_path.display());
        }
    }

    Ok(())
}

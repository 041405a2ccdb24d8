//! Castindex CLI - Index podcast transcripts into a vector store.

mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Castindex - chunk, tag and embed podcast transcripts for semantic search
#[derive(Parser)]
#[command(name = "castindex")]
#[command(version)]
#[command(about = "Chunk, tag and embed podcast transcripts for semantic search", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize castindex (create config and metadata database)
    Init,

    /// Manage configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Run the indexing pipeline over document groups
    Ingest {
        /// Group to process (repeatable; default: configured groups, else all)
        #[arg(short, long = "group")]
        groups: Vec<String>,

        /// Maximum pending documents per group
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Manage the vector index collection
    #[command(subcommand)]
    Index(IndexCommands),

    /// Inspect or reset processing progress
    #[command(subcommand)]
    Progress(ProgressCommands),

    /// Run the tag extractor on a piece of text
    Tag {
        /// Text to tag
        text: String,
    },

    /// Manage episode and show metadata
    #[command(subcommand)]
    Metadata(MetadataCommands),

    /// Show metadata, progress and index status
    Status,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Print the config file path
    Path,

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., chunking.max_chunk_size)
        key: String,

        /// Value to set
        value: String,
    },
}

#[derive(Subcommand)]
enum IndexCommands {
    /// Create the collection if it does not exist
    Create,

    /// Drop the collection
    Drop {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Delete every record but keep the collection
    Clear {
        /// Skip confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// Load the collection for search
    Load,

    /// Show collection statistics
    Stats,
}

#[derive(Subcommand)]
enum ProgressCommands {
    /// Show processed counts per group
    Show,

    /// Forget processed documents
    Reset {
        /// Only reset this group
        #[arg(short, long)]
        group: Option<String>,
    },
}

#[derive(Subcommand)]
enum MetadataCommands {
    /// Import shows and episodes from a JSON file
    Import {
        /// File with {"shows": [...], "episodes": [...]}
        file: PathBuf,
    },

    /// Resolve a filename token to episode metadata
    Resolve {
        /// Filename token, e.g. "RSS_12345_podcast_67_EP3 title"
        filename: String,

        /// Group name used as a show-name hint
        #[arg(short, long)]
        group: Option<String>,
    },
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("castindex=debug,info"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("castindex=info,warn"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Init => commands::init::run(),
        Commands::Config(cmd) => match cmd {
            ConfigCommands::Show => commands::config::show(),
            ConfigCommands::Path => commands::config::path(),
            ConfigCommands::Set { key, value } => commands::config::set(&key, &value),
        },
        Commands::Ingest { groups, limit } => commands::ingest::run(groups, limit),
        Commands::Index(cmd) => match cmd {
            IndexCommands::Create => commands::index::create(),
            IndexCommands::Drop { yes } => commands::index::drop_collection(yes),
            IndexCommands::Clear { yes } => commands::index::clear(yes),
            IndexCommands::Load => commands::index::load(),
            IndexCommands::Stats => commands::index::stats(),
        },
        Commands::Progress(cmd) => match cmd {
            ProgressCommands::Show => commands::progress::show(),
            ProgressCommands::Reset { group } => commands::progress::reset(group),
        },
        Commands::Tag { text } => commands::tag::run(&text),
        Commands::Metadata(cmd) => match cmd {
            MetadataCommands::Import { file } => commands::metadata::import(&file),
            MetadataCommands::Resolve { filename, group } => {
                commands::metadata::resolve(&filename, group)
            }
        },
        Commands::Status => commands::status::run(),
    };

    if let Err(e) = result {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

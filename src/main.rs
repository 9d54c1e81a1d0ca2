//! archive-indexer - recursive archive indexer
//!
//! Command-line front end: indexes one file and prints the manifest as JSON.

use anyhow::{Context, Result};
use archive_indexer::archive::sniff_path;
use archive_indexer::{Entry, IndexOutcome, Indexer, IndexerConfig};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Levels expanded when no depth is given
const DEFAULT_MAX_DEPTH: u32 = 4;

#[derive(Parser)]
#[command(name = "archive-indexer")]
#[command(version)]
#[command(about = "Recursively unpack nested archives and fingerprint every file inside")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit log lines as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a file and print the manifest as JSON
    Index {
        /// File to index
        file: PathBuf,

        /// Maximum number of container levels to expand
        #[arg(short = 'd', long, env = "ARCHIVE_INDEXER_MAX_DEPTH", default_value_t = DEFAULT_MAX_DEPTH)]
        max_depth: u32,

        /// Directory for transient extraction (default: system temp dir)
        #[arg(long, env = "ARCHIVE_INDEXER_SCRATCH_DIR")]
        scratch_dir: Option<PathBuf>,

        /// Type classification binary (default: file)
        #[arg(long, env = "ARCHIVE_INDEXER_FILE_COMMAND")]
        file_command: Option<PathBuf>,

        /// Seconds allowed for classifying one file
        #[arg(long, default_value = "30")]
        classify_timeout: u64,

        /// Pretty-print the JSON report
        #[arg(long)]
        pretty: bool,
    },

    /// Print the detected container format of a file
    Sniff {
        /// File to inspect
        file: PathBuf,
    },
}

/// JSON report for one indexed file
#[derive(Serialize)]
struct Report<'a> {
    archive_filename: String,
    archive_size: u64,
    type_description: String,
    format: Option<&'static str>,
    files: &'a [Entry],
    error_count: u64,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    unsupported: bool,
}

#[derive(Serialize)]
struct Failure {
    exception: String,
}

fn init_logging(verbose: bool, json: bool) -> Result<()> {
    // Only initialize logging if verbose or RUST_LOG is set
    if !verbose && std::env::var("RUST_LOG").is_err() {
        return Ok(());
    }

    let filter = EnvFilter::from_default_env().add_directive(if verbose {
        "archive_indexer=debug".parse()?
    } else {
        "archive_indexer=warn".parse()?
    });

    // stdout carries the report, logs go to stderr
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", text);
    Ok(())
}

fn run_index(indexer: &Indexer, file: &Path, max_depth: u32, pretty: bool) -> Result<()> {
    let archive_size = std::fs::metadata(file)
        .with_context(|| format!("Failed to stat {}", file.display()))?
        .len();
    let type_description = indexer.describe(file);
    let outcome = indexer.index(file, max_depth)?;

    let archive_filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.display().to_string());

    let report = match &outcome {
        IndexOutcome::Indexed { format, manifest } => Report {
            archive_filename,
            archive_size,
            type_description,
            format: Some(format.name()),
            files: manifest.entries(),
            error_count: manifest.error_count(),
            unsupported: false,
        },
        IndexOutcome::Unsupported => Report {
            archive_filename,
            archive_size,
            type_description,
            format: None,
            files: &[],
            error_count: 0,
            unsupported: true,
        },
    };

    print_json(&report, pretty)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json)?;

    match cli.command {
        Commands::Index {
            file,
            max_depth,
            scratch_dir,
            file_command,
            classify_timeout,
            pretty,
        } => {
            let config = IndexerConfig {
                scratch_dir,
                file_command,
                classify_timeout: Duration::from_secs(classify_timeout),
            };

            let result = Indexer::new(config).and_then(|indexer| run_index(&indexer, &file, max_depth, pretty));
            if let Err(e) = result {
                print_json(&Failure { exception: format!("{:?}", e) }, pretty)?;
                std::process::exit(1);
            }
        }

        Commands::Sniff { file } => {
            let format = sniff_path(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            match format {
                Some(format) => println!("{}", format),
                None => println!("unsupported"),
            }
        }
    }

    Ok(())
}

//! # Aen
//!
//! A command-line tool that tags an image library with an ONNX tagger and
//! keeps the results in a SQLite index inside the library.
//!
//! `aen index` tags every new image (or a per-folder sample of them); the
//! other commands inspect and maintain an existing index.

mod args;
mod core;
mod report;

use anyhow::Result;
use args::{Args, Commands};
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

/// The main entry point for the `aen` application.
#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Commands::Index(index) => {
            let outcome = core::run_index(index).await?;
            report::print_index_outcome(&outcome);
        }
        Commands::Cleanup { target_dir } => report::run_cleanup(&target_dir)?,
        Commands::ListChars { target_dir } => report::run_list_chars(&target_dir)?,
        Commands::ListTags { target_dir } => report::run_list_tags(&target_dir)?,
        Commands::Query { target_dir, query } => report::run_query(&target_dir, &query)?,
    }

    Ok(())
}

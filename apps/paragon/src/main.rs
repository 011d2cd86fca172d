//! # Paragon
//!
//! Command-line and HTTP front end for household receipt ingestion.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          paragon binary                                 │
//! │                                                                         │
//! │  data/to_check/*.json ──► paragon ingest ──┐                            │
//! │                                            ├──► Ingestor ──► SQLite     │
//! │  browser / script ──► POST /upload ────────┘        │                   │
//! │                                                     ▼                   │
//! │                                  data/parsed  |  data/rejected          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod cli;
mod error;
mod prompt;
mod server;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so batch output on stdout stays readable
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,paragon=debug,sqlx=warn")),
        )
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    Cli::parse().run().await
}

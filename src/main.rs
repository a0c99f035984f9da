//! pageturn - page-flip capture and document digitization service.
//!
//! Watches a per-session video stream for page-flip gestures, accumulates
//! captured pages into an editable ordered deck, and turns the deck into a
//! titled markdown document via batched text extraction and summarization.

mod capture;
mod cli;
mod config;
mod deck;
mod detect;
mod models;
mod pipeline;
mod providers;
mod server;
mod settings_store;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (before anything else)
    let _ = dotenvy::dotenv();

    // Initialize logging based on verbosity
    let default_filter = if cli::is_verbose() {
        "pageturn=info"
    } else {
        "pageturn=warn"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Run CLI
    cli::run().await
}

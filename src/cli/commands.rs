//! CLI commands implementation.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::config::{load_settings, Settings};
use crate::deck::PageDeck;
use crate::pipeline::extract::BatchExtractor;
use crate::pipeline::summary::SummaryGenerator;
use crate::providers::build_chain;
use crate::settings_store::SettingsStore;

#[derive(Parser)]
#[command(name = "pageturn")]
#[command(about = "Page-flip capture and document digitization service")]
#[command(version)]
pub struct Cli {
    /// Data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the data directory
    Init,

    /// Start the capture and page management server
    Serve {
        /// Address to bind to: PORT, HOST, or HOST:PORT (default: 127.0.0.1:8000)
        #[arg(default_value = "127.0.0.1:8000")]
        bind: String,
    },

    /// Run a pipeline stage over the captured pages
    Process {
        /// Stage to run
        #[arg(value_enum)]
        mode: ProcessMode,
    },

    /// Show deck and pipeline status
    Status,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ProcessMode {
    /// Extract text from page images into the cache
    Extract,
    /// Summarize cached text into a titled document
    Summary,
}

/// Run the CLI.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.data_dir).await;

    match cli.command {
        Commands::Init => cmd_init(&settings).await,
        Commands::Serve { bind } => cmd_serve(&settings, &bind).await,
        Commands::Process { mode } => cmd_process(&settings, mode).await,
        Commands::Status => cmd_status(&settings).await,
    }
}

/// Initialize the data directory and settings store.
async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    println!(
        "  {} Data directory ready: {}",
        style("✓").green(),
        settings.data_dir.display()
    );

    let env_path = settings.env_file_path();
    if !env_path.exists() {
        std::fs::write(
            &env_path,
            "# pageturn provider credentials\n\
             # ZHIPUAI_API_KEY=id.secret\n\
             # LMSTUDIO_API_ENDPOINT=http://localhost:1234/v1\n\
             # LMSTUDIO_MODEL_NAME=gemma-3-12b-it\n",
        )?;
        println!(
            "  {} Wrote settings template: {}",
            style("✓").green(),
            env_path.display()
        );
    }
    Ok(())
}

/// Start the web server.
async fn cmd_serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    let (host, port) = parse_bind_address(bind)?;
    settings.ensure_directories()?;

    println!(
        "{} Starting pageturn server at http://{}:{}",
        style("→").cyan(),
        host,
        port
    );
    println!("  Press Ctrl+C to stop");

    crate::server::serve(settings, &host, port).await
}

/// Run one pipeline stage.
async fn cmd_process(settings: &Settings, mode: ProcessMode) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let store = SettingsStore::new(settings.env_file_path());

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner} {msg}")?);
    spinner.enable_steady_tick(Duration::from_millis(100));

    match mode {
        ProcessMode::Extract => {
            let deck = PageDeck::open(&settings.pages_dir, &settings.deck_meta_path())?;
            let providers = build_chain(&settings.providers.extract, settings, &store)?;
            spinner.set_message(format!("Extracting text from {} pages...", deck.len()));

            let extractor = BatchExtractor::new(settings.clone());
            let staged = extractor.stage(&deck)?;
            let report = extractor.run(staged, &providers).await?;
            spinner.finish_and_clear();

            println!(
                "  {} Extracted {}/{} pages",
                style("✓").green(),
                report.pages_extracted,
                report.pages_total
            );
            if report.batches_failed > 0 {
                println!(
                    "  {} {} batches failed and were skipped",
                    style("!").yellow(),
                    report.batches_failed
                );
            }
        }
        ProcessMode::Summary => {
            let providers = build_chain(&settings.providers.summary, settings, &store)?;
            spinner.set_message("Generating document summary...");

            let report = SummaryGenerator::new(settings.clone()).run(&providers).await?;
            spinner.finish_and_clear();

            println!(
                "  {} Wrote \"{}\" to {}",
                style("✓").green(),
                report.title,
                report.path.display()
            );
        }
    }
    Ok(())
}

/// Show deck and pipeline status.
async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    settings.ensure_directories()?;
    let deck = PageDeck::open(&settings.pages_dir, &settings.deck_meta_path())?;

    println!("{}", style("Pageturn status").bold());
    println!("  Data directory: {}", settings.data_dir.display());
    println!("  Pages in deck:  {}", deck.len());
    println!(
        "  Extract cache:  {}",
        if settings.pages_cache_path().exists() {
            "present"
        } else {
            "absent"
        }
    );

    let documents = match std::fs::read_dir(&settings.output_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .filter(|e| e.path().is_dir())
            .count(),
        Err(_) => 0,
    };
    println!("  Documents:      {}", documents);
    Ok(())
}

/// Parse a bind address that can be:
/// - Just a port: "8000" -> 127.0.0.1:8000
/// - Just a host: "0.0.0.0" -> 0.0.0.0:8000
/// - Host and port: "0.0.0.0:8000" -> 0.0.0.0:8000
fn parse_bind_address(bind: &str) -> anyhow::Result<(String, u16)> {
    if let Ok(port) = bind.parse::<u16>() {
        return Ok(("127.0.0.1".to_string(), port));
    }

    if let Some((host, port_str)) = bind.rsplit_once(':') {
        if let Ok(port) = port_str.parse::<u16>() {
            return Ok((host.to_string(), port));
        }
    }

    Ok((bind.to_string(), 8000))
}

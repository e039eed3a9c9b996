use anyhow::{Context, Result};
use clap::Parser;
use feedreader::bus::EventBus;
use feedreader::config::Config;
use feedreader::feed::HttpFeedSource;
use feedreader::scheduler::Scheduler;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;

/// Default config file path (~/.config/feedreader/config.toml)
fn default_config_path() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home)
        .join(".config")
        .join("feedreader")
        .join("config.toml"))
}

#[derive(Parser, Debug)]
#[command(
    name = "feedreader",
    about = "Polls RSS/Atom feeds hourly and prints new entries as JSON lines"
)]
struct Args {
    /// Config file (defaults to ~/.config/feedreader/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let settings = config.feedreader;

    let bus = EventBus::new(settings.event_bus_capacity);
    let printer = tokio::spawn(print_events(bus.subscribe()));

    let client = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to build HTTP client")?;
    let source = HttpFeedSource::new(client)
        .with_timeout(Duration::from_secs(settings.request_timeout_secs))
        .with_max_feed_size(settings.max_feed_size_bytes);

    let scheduler = Scheduler::new();
    if !feedreader::setup(&settings, &source, &bus, &scheduler).await {
        eprintln!("Error: No feed URLs configured in {}", config_path.display());
        eprintln!();
        eprintln!("Add them under a [feedreader] table:");
        eprintln!("  [feedreader]");
        eprintln!("  urls = [\"https://example.com/feed.xml\"]");
        std::process::exit(1);
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");
    scheduler.shutdown();
    printer.abort();
    Ok(())
}

/// Writes each bus event to stdout as one JSON line.
async fn print_events(mut rx: tokio::sync::broadcast::Receiver<feedreader::bus::Event>) {
    loop {
        match rx.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize event"),
            },
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Event printer fell behind, events dropped");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

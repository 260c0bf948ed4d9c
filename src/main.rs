mod app;
mod backfill;
mod config;
mod db;
mod error;
mod feed;
mod models;
mod notify;
mod reconciler;

use app::App;
use config::Config;
use error::Result;

#[tokio::main]
async fn main() {
    // Initialize logging (stderr so stdout stays clean for notifications)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(if e.is_retryable() { 2 } else { 1 });
    }
}

async fn run() -> Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let no_backfill = args.iter().any(|a| a == "--no-backfill");
    let db_override = args
        .iter()
        .position(|a| a == "--db")
        .and_then(|i| args.get(i + 1))
        .cloned();

    // Load configuration
    let mut config = Config::load()?;
    if let Some(path) = db_override {
        config.db_path = path;
    }

    // One poll cycle per invocation; scheduling is cron's job.
    let app = App::new(&config).await?;
    let outcome = app
        .poll_once(config.backfill_enabled && !no_backfill)
        .await?;

    if outcome.new.is_empty() {
        println!("No new items found.");
    } else {
        println!("Found {} new items.", outcome.new.len());
    }

    Ok(())
}

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};

use neo_watch::app::pipeline_use_case::{dispatch, PipelineOutcome, PipelineUseCase};
use neo_watch::app::ports::NotificationSink;
use neo_watch::config::Config;
use neo_watch::infra::http_client::NasaFeedClient;
use neo_watch::infra::notification_adapter::{LogSink, OutboxSink};
use neo_watch::observability;
use neo_watch::pipeline::ingestion::feed::FeedWindow;
use neo_watch::pipeline::storage::SqliteStore;
use neo_watch::types::LoadOutcome;

#[derive(Parser)]
#[command(name = "neo_watch")]
#[command(about = "Near-Earth object approach pipeline")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a TOML config file (defaults to neo_watch.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the current feed window and run the full pipeline
    Run,
    /// Run the pipeline over a saved feed payload
    Replay {
        /// JSON file holding a feed response
        #[arg(long)]
        input: PathBuf,
    },
    /// Load, validate and print the effective configuration
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    observability::init_logging();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::CheckConfig => {
            println!("{}", toml::to_string_pretty(&config)?);
            println!("✅ Configuration is valid");
            Ok(())
        }
        Commands::Run => {
            init_metrics();
            let use_case = build_use_case(&config)?;
            let client = NasaFeedClient::new(&config.feed)?;
            let now = Utc::now();
            let window = FeedWindow::around(now, config.feed.half_window_hours);

            println!("🚀 Fetching {} → {}", window.start_date, window.end_date);
            let outcome = use_case
                .run(&client, &window, now)
                .await
                .context("Pipeline run failed")?;
            finish(&config, outcome).await
        }
        Commands::Replay { input } => {
            init_metrics();
            let use_case = build_use_case(&config)?;
            let content = std::fs::read_to_string(&input)
                .with_context(|| format!("Failed to read feed payload {}", input.display()))?;
            let payload: serde_json::Value = serde_json::from_str(&content)
                .with_context(|| format!("Feed payload {} is not JSON", input.display()))?;

            println!("🔄 Replaying {}", input.display());
            let outcome = use_case
                .run_payload(&payload, Utc::now())
                .context("Pipeline run failed")?;
            finish(&config, outcome).await
        }
    }
}

fn init_metrics() {
    if let Err(e) = observability::metrics::init() {
        warn!("Metrics disabled: {}", e);
    }
}

fn build_use_case(config: &Config) -> anyhow::Result<PipelineUseCase<SqliteStore>> {
    let db_path = &config.storage.database_path;
    if let Some(dir) = db_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    let store = SqliteStore::open(db_path)
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!(path = %db_path.display(), "opened approach store");
    Ok(PipelineUseCase::new(config, store)?)
}

fn sinks(config: &Config) -> Vec<Box<dyn NotificationSink>> {
    let mut sinks: Vec<Box<dyn NotificationSink>> = vec![Box::new(LogSink)];
    if let Some(path) = &config.notify.outbox_path {
        match OutboxSink::new(path) {
            Ok(outbox) => sinks.push(Box::new(outbox)),
            Err(e) => error!("Notification outbox unavailable: {}", e),
        }
    }
    sinks
}

async fn finish(config: &Config, outcome: PipelineOutcome) -> anyhow::Result<()> {
    print_summary(&outcome);
    let notifications = outcome.notifications(&config.notify.recipients);
    let delivered = dispatch(&notifications, &sinks(config)).await;
    info!(notifications = notifications.len(), delivered, "notifications dispatched");
    Ok(())
}

fn print_summary(outcome: &PipelineOutcome) {
    println!("\n📊 Pipeline Results:");
    match outcome {
        PipelineOutcome::Halted { violations, .. } => {
            println!("   ❌ Validation failed, nothing loaded");
            for violation in violations {
                println!("   - {}", violation);
            }
        }
        PipelineOutcome::Completed { load, .. } => match load {
            LoadOutcome::Loaded { schema, table, batch_id, record_count } => {
                println!("   ✅ Loaded {} records into {}.{} (batch {})", record_count, schema, table, batch_id);
            }
            LoadOutcome::Skipped => println!("   ⏭️  No new records to load"),
            LoadOutcome::Failed { reason } => println!("   ❌ Load failed: {}", reason),
        },
    }
    println!("   Threats: {}", outcome.threats().len());
}

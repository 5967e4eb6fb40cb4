use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use hitcount::classify::{tables, Classifier, NoopHostnameResolver};
use hitcount::config::Config;
use hitcount::plugins::Plugins;
use hitcount::retention::PurgeUnit;
use hitcount::storage::{RequestStorage, SqliteStorage};
use hitcount::traffic::Modules;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hitcount-admin")]
#[command(about = "Hitcount maintenance CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Delete requests older than the given age
    Purge {
        /// Number of units
        amount: u32,
        /// minutes, hours, days, weeks, months or years (singular works too)
        duration: PurgeUnit,
        /// Do not ask for confirmation
        #[arg(long)]
        noinput: bool,
    },
    /// Validate module, plugin and ignore-pattern settings
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Purge {
            amount,
            duration,
            noinput,
        } => purge(&config, amount, duration, noinput).await,
        Commands::Check => check(&config),
    }
}

async fn purge(config: &Config, amount: u32, duration: PurgeUnit, noinput: bool) -> Result<()> {
    let storage: Arc<dyn RequestStorage> = Arc::new(
        SqliteStorage::new(&config.database.url, config.database.max_connections).await?,
    );
    storage.init().await?;

    let cutoff = duration
        .cutoff(amount, Utc::now())
        .with_context(|| format!("{} {} is too far back", amount, duration))?;
    let count = storage.count_before(cutoff).await?;

    if count == 0 {
        println!("Nothing to purge.");
        return Ok(());
    }

    if !noinput && !confirm(amount, duration, count)? {
        println!("Purge cancelled");
        return Ok(());
    }

    let deleted = storage.purge_before(cutoff).await?;
    println!("✓ Deleted {} requests older than {} {}", deleted, amount, duration);
    Ok(())
}

fn confirm(amount: u32, duration: PurgeUnit, count: u64) -> Result<bool> {
    print!(
        "\nYou have requested a database purge.\n\
         This will IRREVERSIBLY DESTROY any requests created before {} {} ago.\n\
         That is a total of {} requests.\n\
         Are you sure you want to do this?\n\n\
         Type 'yes' to continue, or 'no' to cancel: ",
        amount, duration, count
    );
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim() == "yes")
}

fn check(config: &Config) -> Result<()> {
    let metrics = &config.metrics;

    let modules = Modules::new(metrics.traffic_modules.clone(), metrics.module_context());
    let loaded = modules.load().context("traffic modules")?;
    println!("✓ {} traffic modules: {}", loaded.len(), modules.identifiers().join(", "));

    let plugins = Plugins::new(metrics.plugins.clone(), metrics.module_context());
    let loaded = plugins.load().context("plugins")?;
    println!("✓ {} plugins: {}", loaded.len(), plugins.identifiers().join(", "));

    tables::ignore_list(&metrics.ignore_paths).context("METRICS_IGNORE_PATHS")?;
    tables::ignore_list(&metrics.ignore_user_agents).context("METRICS_IGNORE_USER_AGENTS")?;
    Classifier::with_defaults(Arc::new(NoopHostnameResolver)).context("built-in pattern tables")?;
    println!("✓ Pattern tables compile");

    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}

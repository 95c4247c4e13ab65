//! Apiary CLI
//!
//! Command-line interface for the Apiary automation hub.

use anyhow::{Context, Result};
use apiary_config::{load_file, ConfigWatcher, HiveConfig};
use apiary_engine::{Hive, HiveOptions};
use apiary_filters::FilterRegistry;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "apiary")]
#[command(about = "Apiary - Event-driven automation hub", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the hive
    Run {
        /// Configuration file (.json, .yaml or .yml)
        #[arg(short, long, default_value = "./apiary.json")]
        config: PathBuf,

        /// Log level
        #[arg(short, long, default_value = "info")]
        log_level: String,

        /// Reload when the configuration file changes
        #[arg(short, long)]
        watch: bool,

        /// Seconds between configuration file checks
        #[arg(long, default_value_t = 2)]
        watch_interval: u64,
    },

    /// Check a configuration without running it
    Validate {
        /// Configuration file (.json, .yaml or .yml)
        #[arg(short, long, default_value = "./apiary.json")]
        config: PathBuf,
    },

    /// List available bees and filters
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            log_level,
            watch,
            watch_interval,
        } => {
            setup_logging(&log_level)?;
            let interval = watch.then(|| Duration::from_secs(watch_interval.max(1)));
            run_hive(config, interval).await?;
        }
        Commands::Validate { config } => {
            setup_logging("info")?;
            validate_config(config)?;
        }
        Commands::List => {
            setup_logging("warn")?;
            list_registries();
        }
    }

    Ok(())
}

fn setup_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))?;

    Ok(())
}

fn new_hive() -> Hive {
    Hive::new(
        apiary_bees::registry(),
        FilterRegistry::with_builtins(),
        HiveOptions::default(),
    )
}

fn load(path: &Path) -> Result<HiveConfig> {
    load_file(path).with_context(|| format!("Failed to load {}", path.display()))
}

async fn run_hive(path: PathBuf, watch: Option<Duration>) -> Result<()> {
    info!(config = %path.display(), "Starting Apiary");

    let hive = new_hive();
    let issues = hive.start(load(&path)?).await?;
    if !issues.is_empty() {
        warn!(count = issues.len(), "Hive started with configuration issues");
    }

    let mut watcher = ConfigWatcher::new(&path, watch.unwrap_or(Duration::from_secs(2)));
    let mut changes = watcher.subscribe();
    if watch.is_some() {
        watcher.start().await;
    }
    let mut watching = watch.is_some();
    let mut hangup = Hangup::new()?;

    info!("Hive running. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                break;
            }
            _ = hangup.recv() => {
                info!("Received SIGHUP");
                reload(&hive, &path).await;
            }
            change = changes.recv(), if watching => match change {
                Ok(_) | Err(RecvError::Lagged(_)) => reload(&hive, &path).await,
                Err(RecvError::Closed) => watching = false,
            },
        }
    }

    info!("Shutting down hive");
    watcher.stop();
    hive.stop().await?;
    Ok(())
}

/// Reload from disk; a configuration that fails to load keeps the old one running
async fn reload(hive: &Hive, path: &Path) {
    let config = match load(path) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Keeping current configuration");
            return;
        }
    };

    match hive.reload(config).await {
        Ok(issues) => info!(issues = issues.len(), "Configuration reloaded"),
        Err(e) => error!(error = %e, "Reload failed"),
    }
}

fn validate_config(path: PathBuf) -> Result<()> {
    info!("Validating {}", path.display());

    let config = load(&path)?;
    let issues = new_hive().validate(&config);
    for issue in &issues {
        println!("- {}", issue);
    }

    info!(
        bees = config.bees.len(),
        chains = config.chains.len(),
        issues = issues.len(),
        "Validation complete"
    );

    if !issues.is_empty() {
        anyhow::bail!("Found {} configuration issues", issues.len());
    }

    Ok(())
}

fn list_registries() {
    let factories = apiary_bees::registry();
    println!("Bees:");
    for factory in factories.factories() {
        println!("- {} ({}) - {}", factory.id(), factory.name(), factory.description());
        for option in factory.options() {
            println!("    option {} [{}] {}", option.name, option.kind, option.description);
        }
        for event in factory.events() {
            println!("    event  {} - {}", event.name, event.description);
        }
        for action in factory.actions() {
            println!("    action {} - {}", action.name, action.description);
        }
    }

    println!("Filters:");
    for filter in FilterRegistry::with_builtins().filters() {
        println!("- {} - {}", filter.name(), filter.description());
    }
}

/// SIGHUP listener; never fires off unix
#[cfg(unix)]
struct Hangup(tokio::signal::unix::Signal);

#[cfg(unix)]
impl Hangup {
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self(signal(SignalKind::hangup())?))
    }

    async fn recv(&mut self) {
        if self.0.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
struct Hangup;

#[cfg(not(unix))]
impl Hangup {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) {
        std::future::pending::<()>().await;
    }
}

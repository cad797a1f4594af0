use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use cloudmon_client::{MonitoringClient, ResourceStream};
use cloudmon_config::{load_default, load_from_path, CloudmonConfig};
use cloudmon_core::{CloudmonError, Resource};
use cloudmon_telemetry::InMemoryMetricsRecorder;
use futures::TryStreamExt;

/// cloudmon - command line client for the cloud monitoring API
///
/// Configuration discovery rules:
/// 1. If `--config PATH` (or `-c PATH`) is provided, that path is used.
/// 2. Otherwise, `cloudmon_config::load_default()` is used, which probes:
///    - `/etc/cloudmon/cloudmon.toml`
///    - `./cloudmon.toml`
#[derive(Debug, Parser)]
#[command(
    name = "cloudmon",
    version,
    about = "cloud monitoring API client",
    disable_help_subcommand = true
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long = "config", short = 'c', value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log level (overrides `[telemetry].log_level` and RUST_LOG).
    ///
    /// Accepts standard tracing levels (trace, debug, info, warn, error) or a
    /// full filter expression (e.g. "info,cloudmon_client=debug").
    #[arg(long = "log-level", short = 'L', value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit without contacting the API.
    #[arg(long = "check-config", action = ArgAction::SetTrue)]
    check_config: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List entities
    Entities,
    /// List checks of an entity
    Checks {
        #[arg(value_name = "ENTITY")]
        entity_id: String,
    },
    /// List alarms of an entity
    Alarms {
        #[arg(value_name = "ENTITY")]
        entity_id: String,
    },
    /// List notifications
    Notifications,
    /// List notification plans
    Plans,
    /// Delete an entity
    DeleteEntity {
        #[arg(value_name = "ID")]
        entity_id: String,
    },
    /// Print the endpoints resolved from the service catalog
    Catalog,
}

fn main() {
    let cli = Cli::parse();

    // Config is loaded before telemetry so `[telemetry].log_level` can apply;
    // load errors go to stderr directly.
    let config = match load_config(&cli) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("cloudmon: {}", err);
            process::exit(1);
        }
    };

    let level = cli.log_level.as_deref().or_else(|| config.log_level());
    if let Err(err) = cloudmon_telemetry::init(level) {
        eprintln!("cloudmon: failed to initialise telemetry: {}", err);
        process::exit(1);
    }

    if let Err(err) = config.validate() {
        tracing::error!("configuration validation failed: {}", err);
        process::exit(1);
    }

    if cli.check_config {
        tracing::info!("configuration is valid");
        return;
    }

    let Some(command) = cli.command else {
        eprintln!("cloudmon: no command given (see --help)");
        process::exit(2);
    };

    if let Err(err) = run_command_blocking(&config, command) {
        tracing::error!("{:#}", err);
        process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<CloudmonConfig, CloudmonError> {
    match &cli.config {
        Some(path) => load_from_path(path),
        None => load_default(),
    }
}

/// Run one command on a Tokio runtime so `main` stays synchronous.
fn run_command_blocking(config: &CloudmonConfig, command: Command) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let metrics = Arc::new(InMemoryMetricsRecorder::new());
    let client = MonitoringClient::from_config_with_metrics(config, metrics.clone())
        .context("failed to set up monitoring client")?;

    let result = rt.block_on(run_command(&client, command));

    let snapshot = metrics.snapshot();
    tracing::debug!(
        "{} requests ({} ok, {} failed) in {:.3}s",
        snapshot.requests_started,
        snapshot.requests_succeeded,
        snapshot.requests_failed,
        snapshot.total_latency_secs
    );

    result
}

async fn run_command(client: &MonitoringClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Entities => print_all(client.entities()).await,
        Command::Checks { entity_id } => print_all(client.checks(&entity_id)).await,
        Command::Alarms { entity_id } => print_all(client.alarms(&entity_id)).await,
        Command::Notifications => print_all(client.notifications()).await,
        Command::Plans => print_all(client.notification_plans()).await,
        Command::DeleteEntity { entity_id } => {
            if client.delete_entity(&entity_id).await? {
                println!("deleted entity {}", entity_id);
            } else {
                println!("entity {} not found", entity_id);
            }
            Ok(())
        }
        Command::Catalog => {
            let mut endpoints: Vec<_> = client.connection().endpoints().await?.into_iter().collect();
            endpoints.sort_by(|a, b| a.0.cmp(&b.0));
            for (key, endpoint) in endpoints {
                println!("{:<16} {}", key, endpoint);
            }
            Ok(())
        }
    }
}

/// Print records one per line as they arrive.
async fn print_all<T: Into<Resource>>(mut stream: ResourceStream<T>) -> anyhow::Result<()> {
    let mut count = 0usize;
    while let Some(record) = stream.try_next().await? {
        let resource: Resource = record.into();
        println!(
            "{:<20} {:<18} {}",
            resource.id(),
            resource.kind().to_string(),
            resource.label().unwrap_or("-")
        );
        count += 1;
    }
    tracing::info!("listed {} records", count);
    Ok(())
}

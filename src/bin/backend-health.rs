//! # AutoPromptr Backend Health Check
//!
//! Runs a single probe round against every configured backend and prints the
//! aggregated system health report as JSON. Exits non-zero when the system is
//! unhealthy.

use anyhow::Context;
use autopromptr_core::client::HttpBackendClient;
use autopromptr_core::config::ConfigManager;
use autopromptr_core::health::{BackendHealthMonitor, HealthStatus};
use autopromptr_core::logging::init_structured_logging;
use autopromptr_core::services::BackendRegistry;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "backend-health")]
#[command(about = "Probe every configured AutoPromptr backend once")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment whose configuration to load
    #[arg(short, long)]
    env: Option<String>,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();
    let cli = Cli::parse();
    let environment = cli.env.unwrap_or_else(ConfigManager::detect_environment);

    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir, &environment)
        .context("failed to load configuration")?;
    let config = manager.config();

    let client = HttpBackendClient::new(config.health.probe_timeout())
        .context("failed to build HTTP client")?;
    let registry = BackendRegistry::from_config(config);
    let monitor = BackendHealthMonitor::new(Arc::new(client), registry, config.health.clone());

    monitor.probe_all().await;
    let report = monitor.system_report();

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("failed to render health report")?
    );

    if report.overall_status == HealthStatus::Unhealthy {
        std::process::exit(1);
    }
    Ok(())
}

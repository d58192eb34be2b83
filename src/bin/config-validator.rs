//! # AutoPromptr Configuration Validator
//!
//! Loads the layered configuration for an environment, validates it, and
//! prints the sanitized result. Exits non-zero when validation fails.

use anyhow::Context;
use autopromptr_core::config::ConfigManager;
use autopromptr_core::logging::init_structured_logging;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate AutoPromptr configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment to validate (defaults to AUTOPROMPTR_ENV, then development)
    #[arg(short, long)]
    env: Option<String>,

    /// Configuration directory path (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    init_structured_logging();
    let cli = Cli::parse();
    let environment = cli.env.unwrap_or_else(ConfigManager::detect_environment);

    println!("🔍 Validating configuration for environment '{environment}'");

    let manager = match ConfigManager::load_from_directory_with_env(cli.config_dir, &environment)
    {
        Ok(manager) => manager,
        Err(err) => {
            error!(error = %err, "Configuration validation failed");
            println!("❌ Configuration invalid: {err}");
            std::process::exit(1);
        }
    };

    info!(
        environment = %manager.environment(),
        directory = %manager.config_directory().display(),
        "Configuration valid"
    );
    println!("✅ Configuration valid");
    println!(
        "{}",
        serde_json::to_string_pretty(&manager.debug_config())
            .context("failed to render configuration")?
    );
    Ok(())
}

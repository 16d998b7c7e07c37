//! # Orion Configuration Validator
//!
//! Loads the configuration for an environment, validates it, and prints the
//! sanitised result. Exits non-zero when validation fails.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use orion_automation::config::{ClusterConfig, ConfigManager, OrionConfig};
use std::path::PathBuf;
use std::process;
use tracing::{error, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "config-validator")]
#[command(about = "Validate Orion configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment section to merge (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Directory containing orion-config.yaml (default: $ORION_CONFIG_DIR or ./config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format for the sanitised configuration
    #[arg(long, value_enum, default_value_t = Format::Summary)]
    format: Format,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Summary,
    Json,
    Yaml,
}

fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    if let Err(e) = run(&cli) {
        error!("Configuration validation failed: {e:#}");
        println!("❌ {e:#}");
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<()> {
    println!("🔧 Validating Orion Configuration");
    println!("Environment: {}", cli.environment);
    if let Some(dir) = &cli.config_dir {
        println!("Config Directory: {}", dir.display());
    }
    println!();

    let manager = ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
        .context("failed to load configuration")?;
    println!(
        "✅ Loaded {} and validated",
        manager.config_directory().display()
    );

    match cli.format {
        Format::Summary => print_summary(manager.config()),
        Format::Json => println!("{}", serde_json::to_string_pretty(&manager.debug_config())?),
        Format::Yaml => println!("{}", serde_yaml::to_string(&manager.debug_config())?),
    }

    println!("\n🎉 All configuration validation checks passed!");
    Ok(())
}

fn print_summary(config: &OrionConfig) {
    let automation = &config.automation;
    println!("🤖 Automation");
    println!(
        "   sensors every {}ms (timeout {}ms), operators every {}ms (timeout {}ms)",
        automation.sensor_interval_ms,
        automation.sensor_timeout_ms,
        automation.operator_interval_ms,
        automation.operator_timeout_ms
    );

    let actions = &config.actions;
    println!("⚙️  Actions");
    println!(
        "   owner '{}', {} attempts, expiry {}ms",
        actions.automation_owner, actions.default_retry.max_attempts, actions.tracked_action_expiry_ms
    );

    println!("🔗 Coordination");
    println!(
        "   {} (poll {}ms, {} connect attempts)",
        config.coordination.connect_string,
        config.coordination.poll_interval_ms,
        config.coordination.connect_retry.max_attempts
    );

    match &config.management {
        Some(management) => println!(
            "🖥️  Management: {} env '{}' (token {})",
            management.base_url,
            management.environment,
            if management.token.is_some() { "set" } else { "unset" }
        ),
        None => println!("🖥️  Management: not configured"),
    }

    println!("📦 Clusters ({})", config.clusters.len());
    for cluster in &config.clusters {
        print_cluster(cluster);
    }
}

fn print_cluster(cluster: &ClusterConfig) {
    let enabled = cluster
        .enabled_actions
        .as_ref()
        .map_or_else(|| "all actions".to_string(), |names| names.join(", "));
    println!(
        "   • {} ({}, type {}){} - {}",
        cluster.id,
        cluster.name,
        cluster.cluster_type,
        if cluster.maintenance { " [maintenance]" } else { "" },
        enabled
    );
}

//! # Resilience Configuration Validator
//!
//! Command-line tool that loads a resilience configuration file (plus `RESILIENCE_*`
//! environment overrides), validates it and prints the effective configuration as JSON.

use clap::{Parser, Subcommand};
use resilience_core::config::{CircuitBreakerComponentConfig, ConfigLoader, ResilienceConfig};
use resilience_core::logging::log_error;
use std::path::PathBuf;
use std::process;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "resilience-config")]
#[command(about = "Validate resilience configuration files")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file (TOML or YAML); defaults apply when omitted
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Prefix for environment variable overrides
    #[arg(long, default_value = "RESILIENCE")]
    env_prefix: String,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate, then print the effective configuration
    Validate,

    /// Print the effective configuration for one breaker component
    Breaker {
        /// Component name (database, cache, external_api, ...)
        name: String,
    },

    /// Print the built-in defaults
    Defaults,
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
        .with_writer(std::io::stderr)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Breaker { name }) => show_breaker(&cli, name),
        Some(Commands::Defaults) => print_json(&ResilienceConfig::default()),
    };

    if let Err(e) = result {
        log_error("resilience-config", "validate", &e.to_string(), None);
        eprintln!("Configuration invalid: {e}");
        process::exit(1);
    }
}

fn loader(cli: &Cli) -> ConfigLoader {
    let loader = ConfigLoader::new().with_env_prefix(cli.env_prefix.clone());
    match &cli.config {
        Some(path) => loader.with_required_file(path.clone()),
        None => loader,
    }
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = loader(cli).load()?;
    info!(
        health_checks = config.health.checks.len(),
        breaker_overrides = config.circuit_breakers.component_configs.len(),
        "Configuration valid"
    );
    print_json(&config)
}

fn show_breaker(cli: &Cli, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let config = loader(cli).load()?;
    let breaker = config.circuit_breakers.config_for_component(name);
    print_json(&CircuitBreakerComponentConfig::from(&breaker))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

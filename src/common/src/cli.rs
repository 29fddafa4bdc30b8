use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Common CLI arguments
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    #[arg(long, help = "Configuration file path")]
    pub config: Option<PathBuf>,

    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(short, long, help = "Enable quiet mode (minimal output)")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone, Default)]
pub enum CommonCommands {
    /// Start the exporter (default behavior)
    #[default]
    Start,
    /// Show current configuration and exit
    Config {
        #[arg(long, help = "Show configuration in JSON format")]
        json: bool,
    },
    /// Validate configuration and job definitions and exit
    Validate,
    /// Show version information and exit
    Version,
}

/// Utility functions for CLI operations
pub mod utils {
    use super::*;
    use crate::config::Configuration;
    use anyhow::{Context, Result};
    use tracing_subscriber::EnvFilter;

    /// Log level implied by the CLI flags
    pub fn log_level(args: &CommonArgs) -> &'static str {
        if args.quiet {
            "warn"
        } else if args.verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// Initialize logging based on CLI arguments. `RUST_LOG` wins when set.
    pub fn init_logging(args: &CommonArgs) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(log_level(args)));
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    /// Load configuration with optional override from CLI
    pub fn load_config(config_path: Option<&PathBuf>) -> Result<Configuration> {
        match config_path {
            Some(path) => {
                log::info!("Loading configuration from: {}", path.display());
                Configuration::load_from_path(path).context("Failed to load configuration")
            }
            None => Configuration::load().context("Failed to load configuration"),
        }
    }

    /// Display configuration in human-readable or JSON format
    pub fn display_config(config: &Configuration, json: bool) -> Result<()> {
        if json {
            let json = serde_json::to_string_pretty(config)
                .context("Failed to serialize configuration to JSON")?;
            println!("{json}");
        } else {
            println!("Query Exporter Configuration:");
            println!("=============================");
            println!("Listen address: {}", config.server.listen_addr);
            println!("Metrics path: {}", config.server.path);
            println!("Default timeout: {:?}", config.server.default_timeout);
            println!("Time column: {}", config.store.time_column);

            for table in &config.store.tables {
                println!(
                    "Table: {} ({:?}) at {}",
                    table.name, table.format, table.path
                );
            }

            match &config.jobs_dir {
                Some(dir) => println!("Jobs directory: {}", dir.display()),
                None => println!("Jobs directory: none"),
            }

            let names: Vec<&str> = config.jobs.keys().map(String::as_str).collect();
            println!("Inline jobs: {}", names.join(", "));
        }
        Ok(())
    }

    /// Validate the server and store settings
    pub fn validate_config(config: &Configuration) -> Result<()> {
        log::info!("Validating configuration...");

        config
            .server
            .listen_addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("Invalid listen address '{}'", config.server.listen_addr))?;

        if !config.server.path.starts_with('/') {
            anyhow::bail!("Metrics path must start with '/'");
        }

        if config.server.path == "/health" {
            anyhow::bail!("Metrics path cannot be '/health'");
        }

        if config.store.time_column.is_empty() {
            anyhow::bail!("Time column cannot be empty");
        }

        for table in &config.store.tables {
            if table.name.is_empty() {
                anyhow::bail!("Table name cannot be empty");
            }
            if table.path.is_empty() {
                anyhow::bail!("Table '{}' has an empty path", table.name);
            }
        }

        Ok(())
    }

    /// Handle the commands that only need the configuration. Returns `true`
    /// when the command was handled and the process should exit.
    pub fn handle_common_command(command: &CommonCommands, config: &Configuration) -> Result<bool> {
        match command {
            CommonCommands::Config { json } => {
                display_config(config, *json)?;
                Ok(true)
            }
            CommonCommands::Version => {
                println!("{}", version_info());
                Ok(true)
            }
            CommonCommands::Start | CommonCommands::Validate => Ok(false),
        }
    }

    /// Standard version information
    pub fn version_info() -> String {
        format!(
            "{} {} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            env!("CARGO_PKG_RUST_VERSION")
        )
    }
}

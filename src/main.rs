use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::cli::{CommonArgs, CommonCommands, utils};
use common::config::Configuration;
use exporter::http::{HttpState, create_router, run_http_server};
use exporter::{JobRunner, JobTable};
use querier::DataFusionClient;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "query-exporter")]
#[command(about = "Exposes the results of named SQL queries in Prometheus text format")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Option<ExporterCommands>,

    #[arg(long, help = "Override the listen address, e.g. 127.0.0.1:9188")]
    listen_addr: Option<String>,
}

#[derive(Subcommand)]
enum ExporterCommands {
    #[command(flatten)]
    Common(CommonCommands),
}

impl Default for ExporterCommands {
    fn default() -> Self {
        Self::Common(CommonCommands::Start)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    utils::init_logging(&cli.common);

    let mut config = utils::load_config(cli.common.config.as_ref())?;
    if let Some(listen_addr) = cli.listen_addr {
        config.server.listen_addr = listen_addr;
    }

    let command = cli.command.unwrap_or_default();
    let ExporterCommands::Common(ref common_cmd) = command;
    if utils::handle_common_command(common_cmd, &config)? {
        return Ok(());
    }

    utils::validate_config(&config)?;
    let jobs = build_job_table(&config)?;

    if matches!(common_cmd, CommonCommands::Validate) {
        println!("Configuration is valid ({} jobs)", jobs.len());
        return Ok(());
    }

    match run(config, jobs).await {
        Ok(()) => {
            info!("Query exporter stopped");
            Ok(())
        }
        Err(e) => {
            error!("Query exporter failed: {:#}", e);
            Err(e)
        }
    }
}

fn build_job_table(config: &Configuration) -> Result<JobTable> {
    let job_configs = config
        .resolve_jobs()
        .context("Failed to load job definitions")?;
    let jobs = JobTable::from_configs(&job_configs).context("Invalid job definition")?;
    if jobs.is_empty() {
        log::warn!("No jobs configured; every scrape will answer 404");
    }
    Ok(jobs)
}

async fn run(config: Configuration, jobs: JobTable) -> Result<()> {
    let addr: SocketAddr = config
        .server
        .listen_addr
        .parse()
        .with_context(|| format!("Invalid listen address '{}'", config.server.listen_addr))?;

    let client = DataFusionClient::from_config(&config.store)
        .await
        .context("Failed to initialize query backend")?;

    info!(
        jobs = ?jobs.names(),
        tables = config.store.tables.len(),
        "Starting query exporter"
    );

    let runner = JobRunner::new(Arc::new(jobs), Arc::new(client))
        .with_default_timeout(config.server.default_timeout);
    let router = create_router(HttpState::new(Arc::new(runner)), &config.server.path);

    run_http_server(addr, router, shutdown_signal())
        .await
        .context("HTTP server error")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

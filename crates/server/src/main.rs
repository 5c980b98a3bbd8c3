mod api;
mod bridges;
mod cli;
mod feeds;
mod router;
mod startup;
mod state;

use std::path::Path;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use herald_core::Config;
use herald_rules::inspect::extract_entry_point;
use herald_rules::{CompilationEngine, RuleLoader};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    herald_core::config::load_dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();
    config.validate()?;

    match cli.command() {
        Command::Serve {
            host,
            port,
            no_scheduler,
        } => serve(config, host, port, no_scheduler).await,
        Command::TickOnce => tick_once(&config).await,
        Command::CompileCheck { file } => compile_check(&config, &file),
    }
}

async fn serve(
    mut config: Config,
    host: Option<String>,
    port: Option<u16>,
    no_scheduler: bool,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    config.log_summary();

    let state = startup::build_app_state(&config).await?;

    let scheduler_task = if no_scheduler {
        warn!("Scheduler disabled; rules only run via POST /api/scheduler/tick");
        None
    } else {
        let scheduler = state.scheduler.clone();
        Some(tokio::spawn(async move { scheduler.run().await }))
    };

    let app = router::build_router(state.clone());
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.scheduler.shutdown();
    if let Some(task) = scheduler_task {
        if let Err(e) = task.await {
            warn!(error = %e, "scheduler task ended abnormally");
        }
    }
    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c; shutting down");
    }
    info!("Shutdown signal received");
}

/// One tick against the stored rules; the report is printed as JSON.
async fn tick_once(config: &Config) -> anyhow::Result<()> {
    let state = startup::build_app_state(config).await?;
    let report = state.scheduler.run_tick().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    if let Some(reason) = &report.aborted {
        anyhow::bail!("tick aborted: {reason}");
    }
    Ok(())
}

/// Compile and load a rule file without storing it.
fn compile_check(config: &Config, file: &Path) -> anyhow::Result<()> {
    let source = std::fs::read_to_string(file)?;
    let entry_point = extract_entry_point(&source)?;
    let engine = CompilationEngine::new(config.engine.clone())?;

    let artifact = match engine.compile(&source, &entry_point) {
        Ok(artifact) => artifact,
        Err(e) => {
            for diagnostic in e.diagnostics() {
                eprintln!("{}: {}", file.display(), diagnostic);
            }
            return Err(e.into());
        }
    };
    RuleLoader::new().load(&artifact)?;

    println!(
        "{}: ok ({}, {})",
        file.display(),
        artifact.qualified_name(),
        engine.toolchain().version()
    );
    Ok(())
}

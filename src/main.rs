mod cli;
mod ui;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Command};
use jobflow::registry::ServerRegistry;
use jobflow::{JobQuery, JobflowConfig, WorkflowEngine};
use ui::RunProgress;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = JobflowConfig::load_from(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    match cli.command {
        Command::Run {
            query,
            title,
            location,
            max_results,
            json,
        } => {
            let mut query = JobQuery::new(query).with_hints(title, location);
            if let Some(max_results) = max_results {
                query = query.with_max_results(max_results);
            }
            run(&config, query, json).await
        }
        Command::Services => {
            services(&config);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(verbose: bool) {
    // Quiet by default so log lines do not fight the spinner.
    let default = if verbose { "info,jobflow=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

async fn run(config: &JobflowConfig, query: JobQuery, json: bool) -> Result<ExitCode> {
    let engine = WorkflowEngine::from_config(config).context("failed to build the workflow engine")?;
    let raw = query.raw.clone();
    let id = engine.submit_query(query);
    let mut rx = engine.subscribe(id)?;
    let mut progress = (!json).then(|| RunProgress::start(&raw));

    loop {
        let snapshot = rx.borrow_and_update().clone();
        if let Some(progress) = progress.as_mut() {
            progress.update(&snapshot);
        }
        if snapshot.is_terminal() {
            break;
        }
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                engine.cancel(id)?;
            }
        }
    }

    let run = engine.wait(id).await?;
    engine.take_finished(id)?;

    if json {
        ui::print_json(&run);
    } else if let Some(progress) = &progress {
        progress.complete(&run);
        if let Some(output) = &run.output {
            progress.print_output(output);
        }
    }

    Ok(if run.failure.is_some() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn services(config: &JobflowConfig) {
    let registry =
        ServerRegistry::from_config(&config.services, config.workflow.registry_cooldown());
    ui::print_services(&registry.entries());
}

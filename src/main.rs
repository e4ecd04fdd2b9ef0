// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{Cli, Commands, ServeCommands};
use rudder_browser::{BrowserDriver, FakeBrowser};
use rudder_config::Config;
use rudder_knowledge::KnowledgeStore;
use rudder_model::{ChatModel, OpenAiCompatModel};
use rudder_runs::{ArtifactStore, RunManager};
use rudder_tasks::{register_task_tools, TaskService};
use rudder_tools::{register_browser_tools, ToolRegistry, UrlValidator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Some(Commands::ShowConfig) => {
            let config = rudder_config::load(cli.config.as_deref())?;
            println!("{}", serde_yaml_string(&config));
            Ok(())
        }
        Some(Commands::Profile) => {
            let config = rudder_config::load(cli.config.as_deref())?;
            let (service, _registry) = assemble(config).await?;
            println!("{}", service.runtime_profile());
            Ok(())
        }
        Some(Commands::Serve { transport }) => {
            let config = rudder_config::load(cli.config.as_deref())?;
            match transport {
                Some(ServeCommands::Mcp) => serve_mcp(config).await,
                Some(ServeCommands::Http { addr }) => serve_http(config, *addr).await,
                None => serve_http(config, default_addr()).await,
            }
        }
        None => {
            let config = rudder_config::load(cli.config.as_deref())?;
            serve_http(config, default_addr()).await
        }
    }
}

fn default_addr() -> SocketAddr {
    "127.0.0.1:8700".parse().expect("static address")
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn serde_yaml_string(config: &Config) -> String {
    serde_yaml::to_string(config).unwrap_or_default()
}

/// Wire the control plane: driver → stores → tool surface → task service.
///
/// The browser driver is an external collaborator; this binary attaches
/// the built-in scripted driver so the control plane is fully exercisable
/// offline. Embedders wire their CDP driver through the same seam.
async fn assemble(config: Config) -> anyhow::Result<(TaskService, Arc<ToolRegistry>)> {
    let driver: Arc<dyn BrowserDriver> = Arc::new(FakeBrowser::new());
    tracing::info!("using the scripted browser driver; attach a CDP driver for live browsing");

    let model: Arc<dyn ChatModel> = Arc::new(OpenAiCompatModel::new(&config.llm)?);
    let runs = RunManager::new(&config.runs);
    let artifacts = Arc::new(ArtifactStore::new(&config.artifacts));
    let data_dir = rudder_config::data_dir(&config);
    let knowledge = KnowledgeStore::open(&data_dir, config.knowledge.clone())?;
    let validator = Arc::new(UrlValidator::new(config.url.clone()));

    let mut registry = ToolRegistry::new();
    register_browser_tools(&mut registry, driver.clone(), validator, artifacts.clone());

    let service = TaskService::new(config, driver, runs, artifacts, knowledge, model);
    register_task_tools(&mut registry, service.clone());
    let registry = Arc::new(registry);
    service.set_registry(registry.clone());
    Ok((service, registry))
}

async fn serve_http(config: Config, addr: SocketAddr) -> anyhow::Result<()> {
    let (service, _registry) = assemble(config).await?;
    let disposer = service.clone();
    tokio::select! {
        result = rudder_gateway::serve(service, addr) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutting down: draining runs and flushing state");
            disposer.dispose().await;
            Ok(())
        }
    }
}

async fn serve_mcp(config: Config) -> anyhow::Result<()> {
    let (service, registry) = assemble(config).await?;
    let result = rudder_mcp::serve_stdio(registry).await;
    service.dispose().await;
    result
}

// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! AZ Interface: dashboard server and data service CLI

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use az_interface::backend::BackendClient;
use az_interface::config::AppConfig;
use az_interface::context::AppContext;
use az_interface::workflows::RunStatus;
use az_interface::{web, AzError, Result};

/// AZ Interface CLI - observable data services and mock backend
#[derive(Parser, Debug)]
#[command(name = "az-interface")]
#[command(author = "Jonathan D. A. Jewell <hyperpolymath>")]
#[command(version)]
#[command(about = "Dashboard server for discovery targets, curated items and workflow runs", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (JSON format)
    #[arg(short, long, default_value = "config.json", global = true)]
    config: PathBuf,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable trace logging (most verbose)
    #[arg(long, global = true)]
    trace: bool,

    /// Suppress non-essential output (quiet mode)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the dashboard, mock backend and change feed
    Serve {
        /// Bind address (overrides config)
        #[arg(long)]
        host: Option<String>,

        /// Port (overrides config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Start with empty services instead of seed data
        #[arg(long)]
        no_seed: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Check the configured backend
    Status,

    /// Workflow catalog and local runs
    Workflow {
        #[command(subcommand)]
        action: WorkflowCommands,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Generate default configuration file
    Generate {
        /// Output file path
        #[arg(short, long, default_value = "config.json")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Validate configuration file
    Validate,
}

#[derive(Subcommand, Debug)]
enum WorkflowCommands {
    /// List the workflow catalog
    List,

    /// Run a workflow in-process and follow its progress
    Run {
        /// Workflow id
        id: String,

        /// JSON payload passed to the runner
        #[arg(long)]
        payload: Option<String>,
    },
}

fn log_filter(cli: &Cli) -> &'static str {
    if cli.trace {
        "trace"
    } else if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(&cli))
        .with_target(false)
        .init();

    if !cli.quiet {
        info!("AZ Interface v{}", env!("CARGO_PKG_VERSION"));
    }

    // Load configuration
    let config = AppConfig::load(&cli.config)?;

    match cli.command {
        Some(Commands::Serve { host, port, no_seed }) => run_serve(config, host, port, no_seed).await,
        Some(Commands::Config { action }) => run_config_command(config, action, &cli.config),
        Some(Commands::Status) => run_status(config).await,
        Some(Commands::Workflow { action }) => run_workflow_command(config, action).await,
        None => run_serve(config, None, None, false).await,
    }
}

/// Run the web server until Ctrl-C
async fn run_serve(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
    no_seed: bool,
) -> Result<()> {
    if let Some(host) = host {
        config.web.host = host;
    }
    if let Some(port) = port {
        config.web.port = port;
    }
    if no_seed {
        config.seed.enabled = false;
    }
    if !config.web.cors_permissive {
        warn!("CORS is restricted; browser clients on other origins will be refused");
    }

    let context = Arc::new(AppContext::new(config)?);
    web::start_server(context).await
}

fn run_config_command(config: AppConfig, action: ConfigCommands, config_path: &Path) -> Result<()> {
    match action {
        ConfigCommands::Show => {
            let json = serde_json::to_string_pretty(&config)?;
            println!("{}", json);
        }
        ConfigCommands::Generate { output, force } => {
            if output.exists() && !force {
                return Err(AzError::Config(format!(
                    "{:?} already exists. Use --force to overwrite",
                    output
                )));
            }
            AppConfig::default().save(&output)?;
            println!("Generated config at {:?}", output);
        }
        ConfigCommands::Validate => {
            // Loading already validated it
            println!("Configuration at {:?} is valid", config_path);
            println!("  Web: {}:{}", config.web.host, config.web.port);
            println!("  Backend: {}", config.backend.url);
            println!("  Runner: {:?}", config.workflows.runner);
        }
    }

    Ok(())
}

/// Run status check
async fn run_status(config: AppConfig) -> Result<()> {
    let client = BackendClient::from_config(&config.backend)?;

    println!("AZ Interface v{} Status", env!("CARGO_PKG_VERSION"));
    println!("======================");
    println!("Backend: {}", client.base_url());

    match client.health().await {
        Ok(health) => println!("  Health: {} - {}", health.status, health.message),
        Err(e) => println!("  Health: Error - {}", e),
    }

    match client.agents().await {
        Ok(agents) => {
            println!("\nAgents:");
            for agent in &agents {
                println!("  {} ({}) - {}", agent.name, agent.role, agent.status);
            }
        }
        Err(e) => println!("  Error listing agents: {}", e),
    }

    Ok(())
}

async fn run_workflow_command(mut config: AppConfig, action: WorkflowCommands) -> Result<()> {
    config.seed.enabled = false;
    let context = AppContext::new(config)?;

    match action {
        WorkflowCommands::List => {
            for workflow in context.workflows.list_workflows() {
                let state = if workflow.active { "active" } else { "inactive" };
                println!("{:<20} {:<10} {:<9} {}", workflow.id, workflow.trigger, state, workflow.description);
            }
            Ok(())
        }
        WorkflowCommands::Run { id, payload } => {
            let payload = match payload {
                Some(raw) => serde_json::from_str(&raw)
                    .map_err(|e| AzError::validation(format!("payload is not valid JSON: {}", e)))?,
                None => serde_json::Value::Null,
            };

            let handle = context.workflows.trigger(&id, payload)?;
            let run_id = handle.id().clone();
            let _progress = context.workflows.subscribe(move |runs| {
                if let Some(run) = runs.get(&run_id) {
                    let message = run.message.as_deref().unwrap_or("");
                    println!("[{:>3}%] {:?} {}", run.progress, run.status, message);
                }
            });

            let run = handle.wait().await?;
            match run.status {
                RunStatus::Completed => Ok(()),
                _ => Err(AzError::Workflow(format!(
                    "run {} ended as {:?}: {}",
                    run.id,
                    run.status,
                    run.message.unwrap_or_default()
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parsing() {
        let cli = Cli::try_parse_from(["az-interface"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.command.is_none());
        assert_eq!(log_filter(&cli), "info");
    }

    #[test]
    fn test_cli_serve_command() {
        let cli = Cli::try_parse_from([
            "az-interface", "serve", "--port", "9000", "--no-seed", "-v"
        ]).unwrap();

        assert_eq!(log_filter(&cli), "debug");
        match cli.command {
            Some(Commands::Serve { host, port, no_seed }) => {
                assert!(host.is_none());
                assert_eq!(port, Some(9000));
                assert!(no_seed);
            }
            _ => panic!("Expected Serve command"),
        }
    }

    #[test]
    fn test_cli_workflow_run_command() {
        let cli = Cli::try_parse_from([
            "az-interface", "workflow", "run", "curate-digest", "--payload", "{\"limit\": 3}"
        ]).unwrap();

        match cli.command {
            Some(Commands::Workflow { action: WorkflowCommands::Run { id, payload } }) => {
                assert_eq!(id, "curate-digest");
                assert_eq!(payload.as_deref(), Some("{\"limit\": 3}"));
            }
            _ => panic!("Expected Workflow Run command"),
        }
    }

    #[test]
    fn test_generate_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{}").unwrap();

        let action = ConfigCommands::Generate { output: path.clone(), force: false };
        assert!(run_config_command(AppConfig::default(), action, &path).is_err());

        let action = ConfigCommands::Generate { output: path.clone(), force: true };
        run_config_command(AppConfig::default(), action, &path).unwrap();
        assert!(AppConfig::load(&path).is_ok());
    }
}

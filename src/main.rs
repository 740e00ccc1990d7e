use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use relay::config::RelayConfig;

mod cmd;

#[derive(Parser)]
#[command(name = "relay")]
#[command(version, about = "Correlated request/response relay to a WebSocket agent backend")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to relay.toml. Defaults to .relay/relay.toml in the project directory
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Backend WebSocket URL. Overrides relay.toml and RELAY_BACKEND_URL.
    #[arg(long, global = true)]
    pub backend_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to the backend and serve the HTTP API until Ctrl+C
    Serve {
        /// Port to listen on (overrides relay.toml)
        #[arg(long)]
        port: Option<u16>,
        /// Development mode: permissive CORS, bind on all interfaces
        #[arg(long)]
        dev: bool,
    },
    /// Send a single task and print the answer
    Ask {
        task: String,
        #[arg(long)]
        task_id: Option<String>,
    },
    /// Run the migration pipeline over a repository
    Migrate {
        repo: PathBuf,
        #[arg(long)]
        task_id: Option<String>,
        /// Extra instructions appended to every stage prompt
        #[arg(long)]
        prompt: Option<String>,
    },
    /// View, validate or initialize configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration (file + environment)
    Validate,
    /// Write a default relay.toml
    Init,
}

/// Resolve configuration: file → environment → CLI flags.
fn load_config(cli: &Cli, project_dir: &std::path::Path) -> Result<RelayConfig> {
    let mut config = match &cli.config {
        Some(path) => RelayConfig::load(path)?,
        None => RelayConfig::load_or_default(project_dir)?,
    };
    config.apply_env()?;
    if let Some(url) = &cli.backend_url {
        config.backend.url = url.clone();
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(&cli, &project_dir, command.clone());
    }

    let config = load_config(&cli, &project_dir)?;
    relay::logging::init(config.logging.format, cli.verbose);

    match &cli.command {
        Commands::Serve { port, dev } => cmd::cmd_serve(config, *port, *dev).await?,
        Commands::Ask { task, task_id } => cmd::cmd_ask(&config, task, task_id.as_deref()).await?,
        Commands::Migrate {
            repo,
            task_id,
            prompt,
        } => cmd::cmd_migrate(&config, repo, task_id.as_deref(), prompt.as_deref()).await?,
        Commands::Config { .. } => {}
    }

    Ok(())
}

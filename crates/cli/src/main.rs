//! toolmark CLI: the main entry point.
//!
//! Commands:
//! - `run`     : Execute an agent on a task
//! - `status`  : Show an agent's status and recent activity
//! - `agents`  : List agents in the store
//! - `tools`   : List registered tools and their rate limits
//! - `extract` : Show which tool calls a piece of model text contains
//! - `onboard` : Write a default config file
//! - `config`  : Print the effective configuration

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use toolmark_config::AppConfig;
use tracing_subscriber::EnvFilter;

mod commands;
mod runtime;

#[derive(Parser)]
#[command(
    name = "toolmark",
    about = "toolmark — LLM agents with plain-text tool calls",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.toolmark/config.toml)
    #[arg(long, global = true, env = "TOOLMARK_CONFIG")]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute an agent on a task
    Run {
        /// Agent name
        #[arg(short, long)]
        agent: String,

        /// Task text
        #[arg(short, long)]
        task: String,

        /// Execution context as a JSON object
        #[arg(long, conflicts_with = "context_file")]
        context: Option<String>,

        /// Read the execution context from a JSON file
        #[arg(long)]
        context_file: Option<PathBuf>,

        /// Print the full execution result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show an agent's status
    Status {
        #[arg(short, long)]
        agent: String,
    },

    /// List agents
    Agents,

    /// List registered tools
    Tools,

    /// Extract tool calls from text (reads stdin when TEXT is omitted)
    Extract { text: Option<String> },

    /// Write a default configuration file
    Onboard,

    /// Print the effective configuration
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing; logs go to stderr so stdout stays clean for answers
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    match cli.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }

    if let Commands::Onboard = cli.command {
        return commands::onboard::run(cli.config.as_deref()).await;
    }

    let config = load_config(cli.config.as_ref())?;

    match cli.command {
        Commands::Run {
            agent,
            task,
            context,
            context_file,
            json,
        } => {
            let context = commands::run::parse_context(context.as_deref(), context_file.as_deref())?;
            commands::run::run(config, &agent, &task, context, json, cli.verbose).await?
        }
        Commands::Status { agent } => commands::status::run(config, &agent).await?,
        Commands::Agents => commands::agents::run(config).await?,
        Commands::Tools => commands::tools::run(config).await?,
        Commands::Extract { text } => commands::extract::run(config, text).await?,
        Commands::Config => commands::config_cmd::show(&config)?,
        Commands::Onboard => {}
    }

    Ok(())
}

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use macro_proxy::config::{AppConfig, FredApiKey};
use macro_proxy::core::log::init_logging;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to optional configuration file
    #[arg(short, long, global = true)]
    config_path: Option<String>,

    /// FRED API key, normally injected by the hosting environment
    #[arg(long, env = "FRED_API_KEY", hide_env_values = true, global = true)]
    fred_api_key: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create default configuration
    Setup,
    /// Run the HTTP proxy
    Serve {
        /// Address to listen on, overrides the config file
        #[arg(short, long)]
        listen: Option<String>,
    },
    /// Compute global M2 once and print it
    GlobalM2,
}

impl From<Commands> for macro_proxy::AppCommand {
    fn from(cmd: Commands) -> macro_proxy::AppCommand {
        match cmd {
            Commands::Serve { listen } => macro_proxy::AppCommand::Serve { listen },
            Commands::GlobalM2 => macro_proxy::AppCommand::GlobalM2,
            Commands::Setup => unreachable!("Setup command should be handled separately"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let api_key = FredApiKey::new(cli.fred_api_key.unwrap_or_default());
    let result = match cli.command {
        Some(Commands::Setup) => setup(),
        Some(cmd) => macro_proxy::run_command(cmd.into(), cli.config_path.as_deref(), api_key).await,
        None => {
            Cli::command().print_help()?;
            Ok(())
        }
    };

    if let Err(e) = &result {
        tracing::error!(error = %e, "Application failed");
    }
    result
}

fn setup() -> Result<()> {
    use anyhow::Context;

    let path = AppConfig::default_config_path()?;

    if path.exists() {
        anyhow::bail!("Configuration file already exists at {}", path.display());
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    std::fs::write(&path, AppConfig::default().to_yaml()?)
        .with_context(|| format!("Failed to write config file to {}", path.display()))?;

    tracing::info!("Created default configuration at {}", path.display());
    Ok(())
}

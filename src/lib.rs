pub mod config;
pub mod core;
pub mod global_m2;
pub mod providers;
pub mod server;

use anyhow::Result;
use tracing::{debug, info};

use crate::config::{AppConfig, FredApiKey};

pub enum AppCommand {
    /// Run the HTTP proxy, optionally overriding the configured listen address.
    Serve { listen: Option<String> },
    /// Compute the global M2 aggregate once and print it as JSON.
    GlobalM2,
}

pub fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

pub async fn run_command(
    command: AppCommand,
    config_path: Option<&str>,
    api_key: FredApiKey,
) -> Result<()> {
    info!("Macro proxy starting...");
    let mut config = load_config(config_path)?;

    match command {
        AppCommand::Serve { listen } => {
            if let Some(listen) = listen {
                config.server.listen = listen;
            }
            server::serve(&config, api_key).await
        }
        AppCommand::GlobalM2 => {
            let state = server::AppState::from_config(&config, api_key)?;
            let result = global_m2::compute_global_m2(&state.sources(), &state.global_m2).await;
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
    }
}

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::info;

use crate::config::{Config, default_config_path};
use crate::database::{ResultStore, open_store};
use crate::error::AppError;
use crate::orchestrator::Monitor;
use crate::status::StatusReporter;

/// Website health monitor
#[derive(Parser, Debug)]
#[command(name = "sitewatch")]
#[command(version, about = "Website health monitoring and alerting daemon", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ~/.config/sitewatch/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log at DEBUG instead of INFO
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Monitor every configured target until Ctrl-C
    Run,

    /// Print the current status of every target
    Status {
        /// Also write the snapshot as JSON (timestamped name when no path is given)
        #[arg(long, num_args = 0..=1, value_name = "FILE")]
        export: Option<Option<PathBuf>>,
    },

    /// Write a sample configuration with two targets
    InitConfig {
        /// Destination (defaults to the --config path or the default location)
        path: Option<PathBuf>,
    },

    /// Mark an alert as resolved
    Resolve {
        /// Alert id as shown in the status report
        id: i64,
    },
}

pub async fn execute(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Commands::Run => {
            let config = Config::from_config(cli.config.as_ref())?;
            info!("Loaded configuration:\n{config}");
            Monitor::start(config).await?;
        }
        Commands::Status { export } => {
            let config = Config::from_config(cli.config.as_ref())?;
            let store: Arc<dyn ResultStore> = Arc::new(open_store(&config.database_path).await?);
            let reporter = StatusReporter::new(store, config.targets);

            println!("{}", reporter.snapshot().await?);
            if let Some(path) = export {
                let written = reporter.export_report(path.as_deref()).await?;
                println!("Report written to {}", written.display());
            }
        }
        Commands::InitConfig { path } => {
            let path = match path.or(cli.config) {
                Some(path) => path,
                None => default_config_path()?,
            };
            if path.exists() {
                return Err(AppError::AlreadyExists(path));
            }
            Config::sample().write_config(&path)?;
            println!("Sample configuration written to {}", path.display());
        }
        Commands::Resolve { id } => {
            let config = Config::from_config(cli.config.as_ref())?;
            let store = open_store(&config.database_path).await?;
            if !store.resolve_alert(id, Utc::now()).await? {
                return Err(AppError::AlertNotFound(id));
            }
            println!("Alert {id} resolved");
        }
    }

    Ok(())
}

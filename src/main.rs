use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info};

use open_platform_proxy::commands;
use open_platform_proxy::config;
use open_platform_proxy::error::Result;
use open_platform_proxy::plugin::{GatewayPlugin, OpenPlatformPlugin, PluginOptions};

#[derive(Parser, Debug)]
#[command(name = "open-platform-proxy")]
#[command(about = "Open platform client: test environments, allow lists and plugin runner", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (TOML/JSON/YAML)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Debug, clap::Subcommand)]
enum Command {
    /// Run the plugin's background sync and publish loop (default)
    Run,
    /// Validate configuration
    Check {
        /// Also call the platform once to test credentials
        #[arg(long)]
        probe: bool,
    },
    /// Print the current identity -> environment assignments
    Sync,
    /// List test environments
    Envs {
        #[arg(long)]
        group: Option<String>,
    },
    /// Manage the allow list
    #[command(subcommand)]
    Allow(AllowCommand),
    /// Advertise this host as a test environment once
    Publish,
    /// Sign a parameter object with the configured app key
    Sign {
        #[arg(long, default_value = "POST")]
        method: String,
        path: String,
        /// JSON object of request parameters
        params: String,
    },
    /// Decode a sealed log payload
    Decode { text: String },
}

#[derive(Debug, clap::Subcommand)]
enum AllowCommand {
    /// Route an identity to an environment ("ip:port") or "alpha"
    Add { identity: String, value: String },
    /// Remove identities from the allow list
    Remove {
        #[arg(required = true)]
        identities: Vec<String>,
    },
}

fn init_tracing(debug: bool, json: bool) -> anyhow::Result<()> {
    let log_level = if debug { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("open_platform_proxy={log_level}").parse()?);

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug, args.json)?;

    let config = match args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            config::load_from_path(&path).await.map_err(|e| {
                error!("Failed to load configuration from {}: {}", path.display(), e);
                e
            })?
        }
        None => {
            info!("Loading configuration from default locations");
            config::load_from_env_or_file().await.map_err(|e| {
                error!("Failed to load configuration: {}", e);
                e
            })?
        }
    };

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run_plugin(config).await?,
        Command::Check { probe } => commands::run_config_check(config, probe).await?,
        Command::Sync => commands::run_sync(&config).await?,
        Command::Envs { group } => commands::run_list_environments(&config, group.as_deref()).await?,
        Command::Allow(AllowCommand::Add { identity, value }) => {
            commands::run_allow_add(&config, &identity, &value).await?
        }
        Command::Allow(AllowCommand::Remove { identities }) => {
            commands::run_allow_remove(&config, &identities).await?
        }
        Command::Publish => commands::run_publish(&config).await?,
        Command::Sign {
            method,
            path,
            params,
        } => commands::run_sign(&config, &method, &path, &params)?,
        Command::Decode { text } => commands::run_decode(&config, &text)?,
    }

    Ok(())
}

async fn run_plugin(config: config::PluginConfig) -> Result<()> {
    info!("Starting open platform plugin");
    let plugin = OpenPlatformPlugin::new(PluginOptions::new(config))?;
    plugin.init().await?;

    shutdown_signal().await;

    info!("Shutting down open platform plugin");
    let shutdown = tokio::time::timeout(tokio::time::Duration::from_secs(30), plugin.shutdown()).await;
    match shutdown {
        Ok(_) => info!("Graceful shutdown completed"),
        Err(_) => {
            error!("Shutdown timeout exceeded, forcing exit");
            std::process::exit(1);
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received terminate signal");
        },
    }
}

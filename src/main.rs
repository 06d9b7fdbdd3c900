//! pubcycle - Main entry point
//!
//! Connects to the broker, registers the logging listeners, and drives the
//! publish loop until SIGINT or SIGTERM requests an orderly shutdown.

use clap::{Parser, Subcommand};
use pubcycle::config::{BrokerConfig, PublishSettings};
use pubcycle::driver::PublisherLoopDriver;
use pubcycle::listener::{LoggingPublishFailureHandler, LoggingServiceEventHandler};
use pubcycle::observability::init_default_logging;
use pubcycle::transport::{mqtt::RetryPolicy, MessagingService, MqttMessaging};
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

/// Reconnection-aware direct message publisher loop
#[derive(Parser)]
#[command(name = "pubcycle")]
#[command(about = "Publishes direct messages to counter-suffixed topics on a loop")]
#[command(version)]
struct Cli {
    /// Verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the publish loop until interrupted
    Run,
    /// Validate configuration
    Config {
        /// Show the effective configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_default_logging();

    info!("Starting pubcycle v{}", env!("CARGO_PKG_VERSION"));

    let config = BrokerConfig::from_env();

    let result = match cli.command {
        Commands::Run => run_publisher(config).await,
        Commands::Config { show } => handle_config_command(config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {e}");
        process::exit(1);
    }

    info!("Shutdown complete");
}

async fn run_publisher(config: BrokerConfig) -> Result<(), Box<dyn std::error::Error>> {
    // Retry policy is fixed at build time: 20 attempts, 3 seconds apart
    let mut service = MqttMessaging::new(config, RetryPolicy::default())?;

    // Listeners must be registered before connect; they only log
    let session_handler = Arc::new(LoggingServiceEventHandler);
    service.add_reconnection_listener(session_handler.clone());
    service.add_service_interruption_listener(session_handler);
    service.set_publish_failure_listener(Arc::new(LoggingPublishFailureHandler));

    // Connection failure at startup is fatal after the retries run out
    service.connect().await?;
    info!(connected = service.is_connected(), "Messaging service connected");

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let driver = PublisherLoopDriver::new(service, PublishSettings::default(), shutdown_rx);
    let driver_handle = tokio::spawn(driver.run());

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    // The driver observes the flipped token at its next iteration boundary
    // and runs terminate-then-disconnect itself
    let _ = shutdown_tx.send(true);
    let published = driver_handle.await??;
    info!(published, "Publisher loop finished");
    Ok(())
}

fn handle_config_command(config: BrokerConfig, show: bool) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        println!("Effective broker configuration:");
        println!("{}", toml::to_string_pretty(&config)?);
        println!("Publish settings:");
        println!("{}", toml::to_string_pretty(&PublishSettings::default())?);
    }

    info!("Configuration validation complete");
    Ok(())
}

mod config;
mod decoder;
mod downlink;
mod solver;
mod tlv;
mod uplink;

use clap::Parser;
use std::io::Read;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use downlink::WirelessGatewayClient;
use solver::LoRaCloudClient;
use uplink::{Orchestrator, UplinkEvent};

#[derive(Parser)]
#[command(name = "lora-edge-bridge")]
#[command(about = "LoRa Edge tracker bridge: TLV stream decode and solver orchestration")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Uplink event JSON file, or "-" to read from stdin
    event: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = config::Config::load(&cli.config).unwrap_or_else(|e| {
        eprintln!("Warning: Failed to load config from {:?}: {}", cli.config, e);
        eprintln!("Using default configuration");
        config::Config::default()
    });

    // Initialize tracing/logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("lora-edge-bridge v{}", env!("CARGO_PKG_VERSION"));

    let raw_event = if cli.event.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&cli.event)
            .map_err(|e| anyhow::anyhow!("Failed to read event file {:?}: {}", cli.event, e))?
    };
    let event: UplinkEvent = serde_json::from_str(&raw_event)
        .map_err(|e| anyhow::anyhow!("Failed to parse uplink event: {}", e))?;

    // One shared HTTP client for both outbound collaborators
    let http = reqwest::Client::new();
    let solver = LoRaCloudClient::new(http.clone(), &config.solver);
    let emitter = WirelessGatewayClient::new(http, &config.downlink);

    let orchestrator = Orchestrator::new(solver, emitter);
    let result = orchestrator.process(&event).await;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

//! Downlink dispatch to the network-server transport
//!
//! Solver downlink directives are relayed to the device through the
//! network server's `SendDataToWirelessDevice` shape. The solver's port
//! is advisory only: 0 selects the tracker's low-priority port, any
//! other value its primary port.

use anyhow::{Context, Result};
use base64::Engine;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use crate::config::DownlinkConfig;
use crate::solver::types::DownlinkDirective;

/// Port the tracker application listens on; uplinks must arrive on it
pub const TRACKER_PORT: u8 = 199;
/// Port for low-priority downlinks (solver port 0)
pub const LOW_PRIORITY_PORT: u8 = 150;

const TRANSMIT_MODE: u8 = 0;

/// Remap a solver-provided port onto the tracker's port plan
pub fn remap_port(solver_port: u8) -> u8 {
    if solver_port == 0 {
        LOW_PRIORITY_PORT
    } else {
        TRACKER_PORT
    }
}

/// Outbound interface to the downlink transport. Responses never alter
/// orchestration outcome; failures are logged by the caller.
pub trait DownlinkEmitter {
    async fn emit(&self, wireless_device_id: &str, directive: &DownlinkDirective) -> Result<()>;
}

pub struct WirelessGatewayClient {
    http: Client,
    url: String,
}

impl WirelessGatewayClient {
    pub fn new(http: Client, config: &DownlinkConfig) -> Self {
        Self {
            http,
            url: config.url.clone(),
        }
    }
}

impl DownlinkEmitter for WirelessGatewayClient {
    async fn emit(&self, wireless_device_id: &str, directive: &DownlinkDirective) -> Result<()> {
        let raw = hex::decode(&directive.payload)
            .with_context(|| format!("downlink payload is not hex: {:?}", directive.payload))?;
        let payload_b64 = base64::engine::general_purpose::STANDARD.encode(&raw);
        let port = remap_port(directive.port);

        let body = json!({
            "Id": wireless_device_id,
            "TransmitMode": TRANSMIT_MODE,
            "PayloadData": payload_b64,
            "WirelessMetadata": {
                "LoRaWAN": {
                    "FPort": port,
                },
            },
        });

        let resp = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .context("failed to send downlink request")?;
        debug!(
            "Downlink for {} on port {}: transport answered {}",
            wireless_device_id,
            port,
            resp.status()
        );
        Ok(())
    }
}

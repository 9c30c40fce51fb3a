//! HTTP client for the LoRa Cloud modem services API
//!
//! Every request is a POST of `{"<deveui>": body}` to the uplink send
//! endpoint with the API key in the Authorization header. Responses are
//! returned as raw text; error payloads come back through the same
//! channel so the orchestrator can embed them in its result.

use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use super::types::{ScanForward, UplinkForward};
use super::SolverGateway;
use crate::config::SolverConfig;

pub struct LoRaCloudClient {
    http: Client,
    endpoint: String,
    api_key: String,
}

impl LoRaCloudClient {
    pub fn new(http: Client, config: &SolverConfig) -> Self {
        let endpoint = format!(
            "{}{}",
            config.url.trim_end_matches('/'),
            config.uplink_path
        );
        debug!("Solver client created for {}", endpoint);
        Self {
            http,
            endpoint,
            api_key: config.api_key.clone(),
        }
    }

    async fn post<T: Serialize>(&self, deveui: &str, body: &T) -> Result<String> {
        let envelope = json!({ deveui: body });
        let resp = self
            .http
            .post(&self.endpoint)
            .header("Authorization", &self.api_key)
            .json(&envelope)
            .send()
            .await
            .context("failed to send solver request")?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .context("failed to read solver response body")?;
        debug!("Solver responded {} ({} bytes)", status, text.len());
        Ok(text)
    }
}

impl SolverGateway for LoRaCloudClient {
    async fn notify_joining(&self, deveui: &str) -> Result<String> {
        self.post(deveui, &json!({"msgtype": "joining"})).await
    }

    async fn forward_uplink(&self, deveui: &str, uplink: &UplinkForward) -> Result<String> {
        self.post(deveui, uplink).await
    }

    async fn forward_scan(&self, deveui: &str, scan: &ScanForward) -> Result<String> {
        self.post(deveui, scan).await
    }
}

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub solver: SolverConfig,
    pub downlink: DownlinkConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SolverConfig {
    /// Base URL of the LoRa Cloud modem services API
    pub url: String,
    /// Path of the uplink send endpoint
    #[serde(default = "default_uplink_path")]
    pub uplink_path: String,
    /// Authorization header value; overridden by CS_KEY if set
    #[serde(default)]
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownlinkConfig {
    /// Endpoint of the network-server downlink dispatch transport
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

fn default_uplink_path() -> String {
    "/api/v1/uplink/send".to_string()
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file {:?}: {}", path, e))?;
        let mut config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))?;
        if let Ok(key) = std::env::var("CS_KEY") {
            config.solver.api_key = key;
        }
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            solver: SolverConfig {
                url: "https://das.loracloud.com".to_string(),
                uplink_path: default_uplink_path(),
                api_key: std::env::var("CS_KEY").unwrap_or_default(),
            },
            downlink: DownlinkConfig {
                url: "http://localhost:8080/downlink".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
            },
        }
    }
}

//! Wire types for the solver request/response protocol
//!
//! Requests are keyed by the lowercase dashed device EUI:
//! `{"<eui>": {...body...}}`. Responses nest twice:
//! `{"result": {"<eui>": {"result": {...}}}}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of the primary uplink forward
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UplinkForward {
    pub fcnt: u32,
    pub port: u8,
    pub payload: String,
    pub dr: u32,
    pub freq: u64,
    pub timestamp: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanKind {
    Wifi,
    Gnss,
}

/// Body of a secondary scan forward
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanForward {
    pub msgtype: ScanKind,
    pub payload: String,
    pub timestamp: i64,
}

/// Downlink the solver asks us to relay to the device
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DownlinkDirective {
    pub port: u8,
    /// Hex-encoded application payload
    pub payload: String,
}

/// Position fix for a scan. `llh` is latitude/longitude/altitude.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PositionSolution {
    pub llh: [f64; 3],
    pub accuracy: f64,
    #[serde(default)]
    pub gdop: Option<f64>,
    pub timestamp: f64,
}

/// Inner per-device result. Fields the bridge does not consume are
/// ignored; `stream_records` entries stay untyped because the envelope
/// mixes `[index, "<hex>"]` pairs with other shapes we skip.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceResult {
    #[serde(default)]
    pub dnlink: Option<DownlinkDirective>,
    #[serde(default)]
    pub position_solution: Option<PositionSolution>,
    #[serde(default)]
    pub stream_records: Option<Vec<Value>>,
}

/// Extract the hex payload from one stream-record entry, skipping
/// entries that are not `[index, "<hex>"]` arrays.
pub fn stream_payload(entry: &Value) -> Option<&str> {
    entry.as_array()?.get(1)?.as_str()
}

/// Unwrap `{"result": {"<deveui>": {"result": ...}}}` from a raw solver
/// response. `None` for anything else, including unparseable bodies.
pub fn parse_device_result(raw: &str, deveui: &str) -> Option<DeviceResult> {
    let body: Value = serde_json::from_str(raw).ok()?;
    let inner = body.get("result")?.get(deveui)?.get("result")?;
    serde_json::from_value(inner.clone()).ok()
}

//! LoRa Cloud solver gateway
//!
//! The solver turns forwarded uplinks into stream records, downlink
//! directives and (for scan payloads) position solutions. The gateway
//! is a trait so the orchestrator can be driven against fakes in tests.

pub mod client;
pub mod types;

pub use client::LoRaCloudClient;

use types::{ScanForward, UplinkForward};

/// Outbound interface to the solver service. All methods return the raw
/// response body; the caller decides whether it parses as a result
/// envelope or is an error payload to surface.
pub trait SolverGateway {
    /// Best-effort `{"msgtype":"joining"}` notice sent when a device
    /// (re)joins, so the solver resets its session state.
    async fn notify_joining(&self, deveui: &str) -> anyhow::Result<String>;

    /// Primary forward of an uplink payload.
    async fn forward_uplink(&self, deveui: &str, uplink: &UplinkForward)
        -> anyhow::Result<String>;

    /// Secondary forward of a Wi-Fi or GNSS scan extracted from a
    /// stream record.
    async fn forward_scan(&self, deveui: &str, scan: &ScanForward) -> anyhow::Result<String>;
}

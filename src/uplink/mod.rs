//! Uplink event model and per-invocation result aggregate

pub mod orchestrator;

pub use orchestrator::Orchestrator;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use base64::Engine;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::decoder::{AccelSample, SensorReading};

/// Inbound event as delivered by the network server
#[derive(Debug, Clone, Deserialize)]
pub struct UplinkEvent {
    #[serde(rename = "WirelessMetadata")]
    pub wireless_metadata: WirelessMetadata,
    #[serde(rename = "WirelessDeviceId")]
    pub wireless_device_id: String,
    /// Base64-encoded application payload
    #[serde(rename = "PayloadData")]
    pub payload_data: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WirelessMetadata {
    #[serde(rename = "LoRaWAN")]
    pub lorawan: LoRaWanMetadata,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoRaWanMetadata {
    /// 16 hex chars, no separators
    #[serde(rename = "DevEui")]
    pub dev_eui: String,
    #[serde(rename = "FCnt")]
    pub fcnt: u32,
    #[serde(rename = "FPort")]
    pub fport: u8,
    #[serde(rename = "DataRate", default)]
    pub data_rate: Option<u32>,
    #[serde(rename = "Frequency", default)]
    pub frequency: Option<u64>,
    /// ISO-8601, `YYYY-MM-DDTHH:MM:SSZ`
    #[serde(rename = "Timestamp")]
    pub timestamp: String,
}

const DEFAULT_DR: u32 = 0;
const DEFAULT_FREQ_HZ: u64 = 868_100_000;

/// Normalized uplink, created once per invocation
#[derive(Debug, Clone)]
pub struct Uplink {
    /// `AA-BB-...` form, used in the result aggregate
    pub deveui_upper: String,
    /// `aa-bb-...` form, the solver's device key
    pub deveui_lower: String,
    pub fcnt: u32,
    pub port: u8,
    pub dr: u32,
    pub freq: u64,
    pub timestamp_iso: String,
    pub timestamp_epoch: i64,
    /// Hex-encoded application payload
    pub payload_hex: String,
    pub wireless_device_id: String,
}

impl Uplink {
    pub fn from_event(event: &UplinkEvent) -> Result<Self> {
        let lw = &event.wireless_metadata.lorawan;
        let dashed = dash_eui(&lw.dev_eui);
        let payload = base64::engine::general_purpose::STANDARD
            .decode(&event.payload_data)
            .context("PayloadData is not valid base64")?;
        Ok(Self {
            deveui_upper: dashed.to_uppercase(),
            deveui_lower: dashed.to_lowercase(),
            fcnt: lw.fcnt,
            port: lw.fport,
            dr: lw.data_rate.unwrap_or(DEFAULT_DR),
            freq: lw.frequency.unwrap_or(DEFAULT_FREQ_HZ),
            timestamp_iso: lw.timestamp.clone(),
            timestamp_epoch: iso_to_epoch(&lw.timestamp)?,
            payload_hex: hex::encode(payload),
            wireless_device_id: event.wireless_device_id.clone(),
        })
    }
}

/// `0011223344556677` -> `00-11-22-33-44-55-66-77`
fn dash_eui(eui: &str) -> String {
    eui.as_bytes()
        .chunks(2)
        .map(|pair| std::str::from_utf8(pair).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("-")
}

fn iso_to_epoch(iso: &str) -> Result<i64> {
    let naive = NaiveDateTime::parse_from_str(iso, "%Y-%m-%dT%H:%M:%SZ")
        .with_context(|| format!("unparseable uplink timestamp {:?}", iso))?;
    Ok(naive.and_utc().timestamp())
}

/// Accelerometer/battery section of the aggregate. Battery tags update
/// the same section, creating it without samples when they arrive
/// before (or without) an accelerometer record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccelerometerReport {
    pub msgtype: &'static str,
    #[serde(rename = "DevEUI")]
    pub dev_eui: String,
    #[serde(rename = "accVals", skip_serializing_if = "Option::is_none")]
    pub acc_vals: Option<AccelSample>,
    #[serde(rename = "modemCharge", skip_serializing_if = "Option::is_none")]
    pub modem_charge: Option<u32>,
    #[serde(rename = "battLevel", skip_serializing_if = "Option::is_none")]
    pub batt_level: Option<f64>,
    #[serde(rename = "modemVolt", skip_serializing_if = "Option::is_none")]
    pub modem_volt: Option<f64>,
}

impl AccelerometerReport {
    fn empty(dev_eui: &str) -> Self {
        Self {
            msgtype: "accelerometer",
            dev_eui: dev_eui.to_string(),
            acc_vals: None,
            modem_charge: None,
            batt_level: None,
            modem_volt: None,
        }
    }
}

/// Position report for a resolved scan
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationReport {
    pub msgtype: &'static str,
    /// GNSS antenna/solution discriminator (the record's tag)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub soltype: Option<String>,
    #[serde(rename = "DevEUI")]
    pub dev_eui: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub acc: f64,
    pub gdop: f64,
    pub timestamp: f64,
}

/// Per-invocation output. Built incrementally during orchestration,
/// immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultAggregate {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub msgtype: &'static str,
    #[serde(rename = "DevEUI")]
    pub dev_eui: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensors: Option<SensorReading>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accelerometer: Option<AccelerometerReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wifi_location: Option<LocationReport>,
    /// First GNSS fix keys as `gnss_location`, later ones as
    /// `gnss_location_<TAG>` so distinct antennas stay distinct
    #[serde(flatten)]
    pub gnss_locations: BTreeMap<String, LocationReport>,
}

impl ResultAggregate {
    fn new(status_code: u16, msgtype: &'static str, dev_eui: &str, timestamp: &str) -> Self {
        Self {
            status_code,
            msgtype,
            dev_eui: dev_eui.to_string(),
            timestamp: timestamp.to_string(),
            error: None,
            sensors: None,
            accelerometer: None,
            wifi_location: None,
            gnss_locations: BTreeMap::new(),
        }
    }

    /// Normal outcome shell; decoded fields are filled in afterwards
    pub fn reference(dev_eui: &str, timestamp: &str) -> Self {
        Self::new(200, "Reference", dev_eui, timestamp)
    }

    /// Terminal error outcome
    pub fn error(status_code: u16, dev_eui: &str, timestamp: &str, message: String) -> Self {
        let mut agg = Self::new(status_code, "Error", dev_eui, timestamp);
        agg.error = Some(message);
        agg
    }

    /// The accelerometer/battery section, created on first use
    pub fn accelerometer_mut(&mut self) -> &mut AccelerometerReport {
        let dev_eui = self.dev_eui.clone();
        self.accelerometer
            .get_or_insert_with(|| AccelerometerReport::empty(&dev_eui))
    }

    pub fn insert_gnss(&mut self, tag: u8, location: LocationReport) {
        let key = if self.gnss_locations.contains_key("gnss_location") {
            format!("gnss_location_{:02X}", tag)
        } else {
            "gnss_location".to_string()
        };
        self.gnss_locations.insert(key, location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_event(fport: u8, fcnt: u32) -> UplinkEvent {
        serde_json::from_value(json!({
            "WirelessMetadata": {
                "LoRaWAN": {
                    "DevEui": "0011223344556677",
                    "FCnt": fcnt,
                    "FPort": fport,
                    "DataRate": 5,
                    "Frequency": 867500000u64,
                    "Timestamp": "2021-04-01T12:00:00Z",
                }
            },
            "WirelessDeviceId": "wd-1234",
            "PayloadData": "qrs=",
        }))
        .unwrap()
    }

    #[test]
    fn test_normalize_event() {
        let uplink = Uplink::from_event(&sample_event(199, 7)).unwrap();
        assert_eq!(uplink.deveui_upper, "00-11-22-33-44-55-66-77");
        assert_eq!(uplink.deveui_lower, "00-11-22-33-44-55-66-77");
        assert_eq!(uplink.fcnt, 7);
        assert_eq!(uplink.port, 199);
        assert_eq!(uplink.dr, 5);
        assert_eq!(uplink.freq, 867_500_000);
        assert_eq!(uplink.timestamp_epoch, 1_617_278_400);
        assert_eq!(uplink.payload_hex, "aabb");
    }

    #[test]
    fn test_eui_case_split() {
        let mut event = sample_event(199, 0);
        event.wireless_metadata.lorawan.dev_eui = "AaBbCcDdEeFf0011".to_string();
        let uplink = Uplink::from_event(&event).unwrap();
        assert_eq!(uplink.deveui_upper, "AA-BB-CC-DD-EE-FF-00-11");
        assert_eq!(uplink.deveui_lower, "aa-bb-cc-dd-ee-ff-00-11");
    }

    #[test]
    fn test_dr_and_freq_defaults() {
        let mut event = sample_event(199, 0);
        event.wireless_metadata.lorawan.data_rate = None;
        event.wireless_metadata.lorawan.frequency = None;
        let uplink = Uplink::from_event(&event).unwrap();
        assert_eq!(uplink.dr, 0);
        assert_eq!(uplink.freq, 868_100_000);
    }

    #[test]
    fn test_bad_base64_is_an_error() {
        let mut event = sample_event(199, 0);
        event.payload_data = "!!notbase64!!".to_string();
        assert!(Uplink::from_event(&event).is_err());
    }

    #[test]
    fn test_gnss_keying_stays_distinct() {
        let mut agg = ResultAggregate::reference("00-11", "2021-04-01T12:00:00Z");
        let loc = |tag: u8| LocationReport {
            msgtype: "gnss",
            soltype: Some(format!("{:02X}", tag)),
            dev_eui: "00-11".to_string(),
            latitude: 1.0,
            longitude: 2.0,
            altitude: 3.0,
            acc: 10.0,
            gdop: 1.5,
            timestamp: 1.0,
        };
        agg.insert_gnss(0x06, loc(0x06));
        agg.insert_gnss(0x07, loc(0x07));
        assert!(agg.gnss_locations.contains_key("gnss_location"));
        assert!(agg.gnss_locations.contains_key("gnss_location_07"));

        let rendered = serde_json::to_value(&agg).unwrap();
        assert_eq!(rendered["gnss_location"]["soltype"], "06");
        assert_eq!(rendered["gnss_location_07"]["soltype"], "07");
    }

    #[test]
    fn test_error_fields_skipped_when_absent() {
        let agg = ResultAggregate::reference("00-11", "2021-04-01T12:00:00Z");
        let rendered = serde_json::to_value(&agg).unwrap();
        assert_eq!(rendered["statusCode"], 200);
        assert_eq!(rendered["msgtype"], "Reference");
        assert!(rendered.get("error").is_none());
        assert!(rendered.get("sensors").is_none());
        assert!(rendered.get("wifi_location").is_none());
    }

    #[test]
    fn test_battery_before_accelerometer_creates_section() {
        let mut agg = ResultAggregate::reference("00-11", "2021-04-01T12:00:00Z");
        agg.accelerometer_mut().modem_volt = Some(3.5);
        let report = agg.accelerometer.as_ref().unwrap();
        assert_eq!(report.msgtype, "accelerometer");
        assert!(report.acc_vals.is_none());
        assert_eq!(report.modem_volt, Some(3.5));
    }
}

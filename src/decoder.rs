//! Tag-specific decoders for tracker stream records
//!
//! Each record extracted by the TLV codec is dispatched by tag: simple
//! telemetry tags decode in-process to a [`DecodedReading`], scan tags
//! (Wi-Fi, GNSS) decode to a scan request the orchestrator forwards to
//! the solver for a position fix. Tags unknown to this decoder version
//! are skipped so newer firmware can ship forward-compatible records.

use thiserror::Error;

use crate::tlv::{TlvError, TlvRecord};

/// Tracker tags currently understood
pub const TAG_GNSS_NAV: u8 = 0x05;
pub const TAG_GNSS_PCB: u8 = 0x06;
pub const TAG_GNSS_PATCH: u8 = 0x07;
pub const TAG_WIFI_LEGACY: u8 = 0x08;
pub const TAG_ACCELEROMETER: u8 = 0x09;
pub const TAG_MODEM_CHARGE: u8 = 0x0A;
pub const TAG_MODEM_VOLTAGE: u8 = 0x0B;
pub const TAG_SENSORS: u8 = 0x0D;
pub const TAG_WIFI: u8 = 0x0E;

/// Full charge of the tracker battery in accumulated-charge units
const BATTERY_FULL_CHARGE: f64 = 2400.0;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    #[error("tag {tag:02X}: expected value of {expected} bytes, got {got}")]
    Length {
        tag: u8,
        expected: &'static str,
        got: usize,
    },
    #[error(transparent)]
    Tlv(#[from] TlvError),
}

/// What to do with a record, keyed by tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagAction {
    /// Decode in-process, no solver round trip
    Decode,
    /// Forward to the solver as a Wi-Fi scan
    WifiScan,
    /// Forward to the solver as a GNSS scan
    GnssScan,
}

/// Tag dispatch table. `None` means the tag is unrecognized and the
/// record is skipped without error.
pub fn classify(tag: u8) -> Option<TagAction> {
    match tag {
        TAG_SENSORS | TAG_ACCELEROMETER | TAG_MODEM_CHARGE | TAG_MODEM_VOLTAGE => {
            Some(TagAction::Decode)
        }
        TAG_WIFI | TAG_WIFI_LEGACY => Some(TagAction::WifiScan),
        TAG_GNSS_NAV | TAG_GNSS_PCB | TAG_GNSS_PATCH => Some(TagAction::GnssScan),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(tag = "type")]
pub enum SensorReading {
    #[serde(rename = "sensor_basic")]
    Basic { version: u8, move_history: u8 },
    #[serde(rename = "sensor_full")]
    Full {
        version: u8,
        move_history: u8,
        #[serde(rename = "temperature_C")]
        temperature_c: f64,
        accumulated_charge: u32,
        #[serde(rename = "battLevel")]
        batt_level: f64,
        voltage: f64,
    },
}

#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct AccelSample {
    /// Motion state over the last 8 update periods, bit 0 first
    #[serde(rename = "motArr")]
    pub mot_arr: [&'static str; 8],
    #[serde(rename = "xAcc_mg")]
    pub x_acc_mg: f64,
    #[serde(rename = "yAcc_mg")]
    pub y_acc_mg: f64,
    #[serde(rename = "zAcc_mg")]
    pub z_acc_mg: f64,
    #[serde(rename = "Temp_C")]
    pub temp_c: f64,
}

/// A Wi-Fi scan ready to forward to the solver
#[derive(Debug, Clone, PartialEq)]
pub struct WifiScanRequest {
    /// Solver payload: `01` (U-WIFILOC-MACRSSI) + RSSI/MAC scan bytes
    pub payload: String,
    /// Capture timestamp embedded in the record; `None` means the
    /// record carried no usable timestamp and the uplink's applies
    pub embedded_timestamp: Option<u64>,
}

/// A GNSS scan ready to forward to the solver
#[derive(Debug, Clone, PartialEq)]
pub struct GnssScanRequest {
    /// Antenna/solution-type discriminator (the record's tag)
    pub tag: u8,
    /// Opaque NAV message, forwarded verbatim
    pub payload: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DecodedReading {
    Sensor(SensorReading),
    Accelerometer(AccelSample),
    BatteryCharge { charge: u32, batt_level: f64 },
    BatteryVoltage { volts: f64 },
    WifiScan(WifiScanRequest),
    GnssScan(GnssScanRequest),
}

/// Remaining battery percentage from an accumulated-charge counter.
/// Matches the tracker reference firmware; intentionally unclamped.
pub fn battery_level_percent(charge: u32) -> f64 {
    100.0 * (BATTERY_FULL_CHARGE - charge as f64) / BATTERY_FULL_CHARGE
}

/// Decode one record. `Ok(None)` means the tag is unrecognized.
pub fn decode_record(record: &TlvRecord<'_>) -> Result<Option<DecodedReading>, DecodeError> {
    let reading = match classify(record.tag) {
        None => return Ok(None),
        Some(TagAction::Decode) => match record.tag {
            TAG_SENSORS => decode_sensors(record)?,
            TAG_ACCELEROMETER => decode_accelerometer(record)?,
            TAG_MODEM_CHARGE => decode_charge(record)?,
            TAG_MODEM_VOLTAGE => decode_voltage(record)?,
            _ => unreachable!("classify() returned Decode for unhandled tag"),
        },
        Some(TagAction::WifiScan) => decode_wifi_scan(record)?,
        Some(TagAction::GnssScan) => DecodedReading::GnssScan(GnssScanRequest {
            tag: record.tag,
            payload: record.value.to_string(),
        }),
    };
    Ok(Some(reading))
}

fn decode_sensors(record: &TlvRecord<'_>) -> Result<DecodedReading, DecodeError> {
    let bytes = record.value_bytes()?;
    let version = bytes.first().map(|b| b >> 4).unwrap_or_default();
    let move_history = bytes.first().map(|b| b & 0x0F).unwrap_or_default();
    match bytes.len() {
        1 => Ok(DecodedReading::Sensor(SensorReading::Basic {
            version,
            move_history,
        })),
        7 => {
            let temperature_c = u16::from_be_bytes([bytes[1], bytes[2]]) as f64 / 100.0;
            let accumulated_charge = u16::from_be_bytes([bytes[3], bytes[4]]) as u32;
            let voltage = u16::from_be_bytes([bytes[5], bytes[6]]) as f64 / 1000.0;
            Ok(DecodedReading::Sensor(SensorReading::Full {
                version,
                move_history,
                temperature_c,
                accumulated_charge,
                batt_level: battery_level_percent(accumulated_charge),
                voltage,
            }))
        }
        got => Err(DecodeError::Length {
            tag: record.tag,
            expected: "1 or 7",
            got,
        }),
    }
}

fn decode_accelerometer(record: &TlvRecord<'_>) -> Result<DecodedReading, DecodeError> {
    let bytes = record.value_bytes()?;
    if bytes.len() != 9 {
        return Err(DecodeError::Length {
            tag: record.tag,
            expected: "9",
            got: bytes.len(),
        });
    }
    let mut mot_arr = ["Still"; 8];
    for (i, slot) in mot_arr.iter_mut().enumerate() {
        if bytes[0] & (1 << i) != 0 {
            *slot = "Motion";
        }
    }
    Ok(DecodedReading::Accelerometer(AccelSample {
        mot_arr,
        x_acc_mg: i16::from_be_bytes([bytes[1], bytes[2]]) as f64 / 1000.0,
        y_acc_mg: i16::from_be_bytes([bytes[3], bytes[4]]) as f64 / 1000.0,
        z_acc_mg: i16::from_be_bytes([bytes[5], bytes[6]]) as f64 / 1000.0,
        temp_c: i16::from_be_bytes([bytes[7], bytes[8]]) as f64 / 100.0,
    }))
}

fn decode_charge(record: &TlvRecord<'_>) -> Result<DecodedReading, DecodeError> {
    let bytes = record.value_bytes()?;
    let raw: [u8; 4] = bytes.as_slice().try_into().map_err(|_| DecodeError::Length {
        tag: record.tag,
        expected: "4",
        got: bytes.len(),
    })?;
    let charge = u32::from_be_bytes(raw);
    Ok(DecodedReading::BatteryCharge {
        charge,
        batt_level: battery_level_percent(charge),
    })
}

fn decode_voltage(record: &TlvRecord<'_>) -> Result<DecodedReading, DecodeError> {
    let bytes = record.value_bytes()?;
    let raw: [u8; 2] = bytes.as_slice().try_into().map_err(|_| DecodeError::Length {
        tag: record.tag,
        expected: "2",
        got: bytes.len(),
    })?;
    Ok(DecodedReading::BatteryVoltage {
        volts: u16::from_be_bytes(raw) as f64 / 1000.0,
    })
}

fn decode_wifi_scan(record: &TlvRecord<'_>) -> Result<DecodedReading, DecodeError> {
    let request = match record.tag {
        // Variant 0E: header byte, 4-byte capture epoch, then the scan.
        // A zero epoch means the tracker had no time fix yet.
        TAG_WIFI => {
            let (epoch_hex, scan) = match (record.value.get(2..10), record.value.get(10..)) {
                (Some(epoch_hex), Some(scan)) => (epoch_hex, scan),
                _ => {
                    return Err(DecodeError::Length {
                        tag: record.tag,
                        expected: "at least 5",
                        got: record.length,
                    })
                }
            };
            let epoch = u64::from_str_radix(epoch_hex, 16).map_err(|_| TlvError::InvalidHex {
                field: "value",
                text: epoch_hex.to_string(),
            })?;
            WifiScanRequest {
                payload: format!("01{}", scan),
                embedded_timestamp: (epoch != 0).then_some(epoch),
            }
        }
        // Variant 08: the whole value is the scan, no embedded time
        _ => WifiScanRequest {
            payload: format!("01{}", record.value),
            embedded_timestamp: None,
        },
    };
    Ok(DecodedReading::WifiScan(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tlv::records;

    fn single(payload: &str) -> Option<DecodedReading> {
        let recs: Vec<_> = records(payload).collect::<Result<_, _>>().unwrap();
        assert_eq!(recs.len(), 1);
        decode_record(&recs[0]).unwrap()
    }

    #[test]
    fn test_sensor_basic_nibbles() {
        let reading = single("0d0113").unwrap();
        assert_eq!(
            reading,
            DecodedReading::Sensor(SensorReading::Basic {
                version: 1,
                move_history: 3,
            })
        );
    }

    #[test]
    fn test_sensor_full_vector() {
        // version=1 move_history=3, temp 0x09C4=2500 -> 25.00 C,
        // charge 0x0960=2400 -> battLevel 0.0, voltage 0x0DAC -> 3.500 V
        let reading = single("0d071309c409600dac").unwrap();
        assert_eq!(
            reading,
            DecodedReading::Sensor(SensorReading::Full {
                version: 1,
                move_history: 3,
                temperature_c: 25.0,
                accumulated_charge: 2400,
                batt_level: 0.0,
                voltage: 3.5,
            })
        );
    }

    #[test]
    fn test_sensor_bad_length() {
        let recs: Vec<_> = records("0d03aabbcc").collect::<Result<_, _>>().unwrap();
        assert!(matches!(
            decode_record(&recs[0]),
            Err(DecodeError::Length { tag: 0x0D, .. })
        ));
    }

    #[test]
    fn test_accelerometer_motion_bitmask() {
        // bit 0 set -> first period Motion, rest Still
        let reading = single("0909010000000000000000").unwrap();
        match reading {
            DecodedReading::Accelerometer(sample) => {
                assert_eq!(sample.mot_arr[0], "Motion");
                assert!(sample.mot_arr[1..].iter().all(|&m| m == "Still"));
            }
            other => panic!("expected accelerometer, got {:?}", other),
        }
    }

    #[test]
    fn test_accelerometer_signed_axes_and_temp() {
        // x=-1000 (0xFC18), y=500, z=1000, temp=2345 -> 23.45 C
        let reading = single("0909fffc1801f403e80929").unwrap();
        match reading {
            DecodedReading::Accelerometer(sample) => {
                assert!(sample.mot_arr.iter().all(|&m| m == "Motion"));
                assert_eq!(sample.x_acc_mg, -1.0);
                assert_eq!(sample.y_acc_mg, 0.5);
                assert_eq!(sample.z_acc_mg, 1.0);
                assert_eq!(sample.temp_c, 23.45);
            }
            other => panic!("expected accelerometer, got {:?}", other),
        }
    }

    #[test]
    fn test_battery_charge_levels() {
        assert_eq!(
            single("0a0400000960").unwrap(),
            DecodedReading::BatteryCharge {
                charge: 2400,
                batt_level: 0.0,
            }
        );
        assert_eq!(
            single("0a0400000000").unwrap(),
            DecodedReading::BatteryCharge {
                charge: 0,
                batt_level: 100.0,
            }
        );
    }

    #[test]
    fn test_battery_voltage() {
        assert_eq!(
            single("0b020dac").unwrap(),
            DecodedReading::BatteryVoltage { volts: 3.5 }
        );
    }

    #[test]
    fn test_wifi_scan_with_embedded_timestamp() {
        // header 01, epoch 0x60000000, two scan bytes
        let reading = single("0e070160000000aabb").unwrap();
        assert_eq!(
            reading,
            DecodedReading::WifiScan(WifiScanRequest {
                payload: "01aabb".to_string(),
                embedded_timestamp: Some(0x6000_0000),
            })
        );
    }

    #[test]
    fn test_wifi_scan_zero_timestamp_defers_to_uplink() {
        let reading = single("0e070100000000aabb").unwrap();
        assert_eq!(
            reading,
            DecodedReading::WifiScan(WifiScanRequest {
                payload: "01aabb".to_string(),
                embedded_timestamp: None,
            })
        );
    }

    #[test]
    fn test_wifi_legacy_scan_prefixes_whole_value() {
        let reading = single("0803aabbcc").unwrap();
        assert_eq!(
            reading,
            DecodedReading::WifiScan(WifiScanRequest {
                payload: "01aabbcc".to_string(),
                embedded_timestamp: None,
            })
        );
    }

    #[test]
    fn test_gnss_scan_keeps_tag_and_payload() {
        let reading = single("0604deadbeef").unwrap();
        assert_eq!(
            reading,
            DecodedReading::GnssScan(GnssScanRequest {
                tag: 0x06,
                payload: "deadbeef".to_string(),
            })
        );
    }

    #[test]
    fn test_unknown_tag_is_skipped() {
        assert_eq!(single("ff02aabb"), None);
    }

    #[test]
    fn test_classify_table() {
        assert_eq!(classify(0x0D), Some(TagAction::Decode));
        assert_eq!(classify(0x0E), Some(TagAction::WifiScan));
        assert_eq!(classify(0x08), Some(TagAction::WifiScan));
        for tag in [0x05, 0x06, 0x07] {
            assert_eq!(classify(tag), Some(TagAction::GnssScan));
        }
        assert_eq!(classify(0x00), None);
        assert_eq!(classify(0xFF), None);
    }
}

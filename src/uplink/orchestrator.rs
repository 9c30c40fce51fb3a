//! Uplink processing pipeline
//!
//! One invocation runs: validate the port, notify the solver of a
//! (re)join when the frame counter is fresh, forward the payload,
//! relay any downlink, then decode every stream record the solver
//! returns and dispatch each by tag: telemetry tags decode in-process,
//! scan tags make a second solver round trip for a position fix.
//! Everything is strictly sequential; per-record failures are contained
//! to that record.

use tracing::{debug, info, warn};

use crate::decoder::{decode_record, DecodedReading, GnssScanRequest, WifiScanRequest};
use crate::downlink::{DownlinkEmitter, TRACKER_PORT};
use crate::solver::types::{
    parse_device_result, stream_payload, DeviceResult, DownlinkDirective, ScanForward, ScanKind,
    UplinkForward,
};
use crate::solver::SolverGateway;
use crate::tlv;
use crate::uplink::{LocationReport, ResultAggregate, Uplink, UplinkEvent};

pub struct Orchestrator<S, D> {
    solver: S,
    downlink: D,
}

/// Threshold under which an uplink is treated as the first messages
/// after a device (re)join
const JOIN_FCNT_LIMIT: u32 = 2;

impl<S: SolverGateway, D: DownlinkEmitter> Orchestrator<S, D> {
    pub fn new(solver: S, downlink: D) -> Self {
        Self { solver, downlink }
    }

    /// Process one uplink event to completion. Always returns a result
    /// aggregate, never an error.
    pub async fn process(&self, event: &UplinkEvent) -> ResultAggregate {
        let uplink = match Uplink::from_event(event) {
            Ok(uplink) => uplink,
            Err(e) => {
                let lw = &event.wireless_metadata.lorawan;
                return ResultAggregate::error(
                    400,
                    &lw.dev_eui.to_uppercase(),
                    &lw.timestamp,
                    format!("Malformed uplink event: {:#}", e),
                );
            }
        };

        if uplink.port != TRACKER_PORT {
            info!(
                "Rejecting uplink from {}: port {} instead of {}",
                uplink.deveui_upper, uplink.port, TRACKER_PORT
            );
            return ResultAggregate::error(
                400,
                &uplink.deveui_upper,
                &uplink.timestamp_iso,
                format!(
                    "Port number {} expected, received: {}",
                    TRACKER_PORT, uplink.port
                ),
            );
        }

        // A fresh frame counter means the device rejoined and the
        // solver must reset its stream session. Best effort only.
        if uplink.fcnt < JOIN_FCNT_LIMIT {
            match self.solver.notify_joining(&uplink.deveui_lower).await {
                Ok(resp) => debug!("Join notice response: {}", resp),
                Err(e) => warn!("Join notice failed (ignored): {:#}", e),
            }
        }

        let forward = UplinkForward {
            fcnt: uplink.fcnt,
            port: uplink.port,
            payload: uplink.payload_hex.clone(),
            dr: uplink.dr,
            freq: uplink.freq,
            timestamp: uplink.timestamp_epoch,
        };
        let raw = match self
            .solver
            .forward_uplink(&uplink.deveui_lower, &forward)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                return ResultAggregate::error(
                    404,
                    &uplink.deveui_upper,
                    &uplink.timestamp_iso,
                    format!("Error, solver unreachable: {:#}", e),
                )
            }
        };
        let Some(result) = parse_device_result(&raw, &uplink.deveui_lower) else {
            return ResultAggregate::error(
                404,
                &uplink.deveui_upper,
                &uplink.timestamp_iso,
                format!("Error, Bad CS response: {}", raw),
            );
        };

        let mut agg = ResultAggregate::reference(&uplink.deveui_upper, &uplink.timestamp_iso);

        if let Some(directive) = &result.dnlink {
            self.relay_downlink(&uplink, directive).await;
        }

        for entry in result.stream_records.iter().flatten() {
            match stream_payload(entry) {
                Some(payload) => self.process_stream(&uplink, payload, &mut agg).await,
                None => debug!("Skipping non-record stream entry: {}", entry),
            }
        }

        agg
    }

    /// Decode one stream-record payload and dispatch each TLV record.
    /// A truncated stream aborts this payload only; records already
    /// dispatched stay in the aggregate.
    async fn process_stream(&self, uplink: &Uplink, payload: &str, agg: &mut ResultAggregate) {
        for item in tlv::records(payload) {
            let record = match item {
                Ok(record) => record,
                Err(e) => {
                    warn!("Aborting stream record: {}", e);
                    break;
                }
            };
            debug!(
                "received tag:{:02X}, length:{}, value:{}",
                record.tag, record.length, record.value
            );
            match decode_record(&record) {
                Ok(Some(reading)) => self.apply_reading(uplink, reading, agg).await,
                Ok(None) => debug!("Skipping unrecognized tag {:02X}", record.tag),
                Err(e) => warn!("Dropping undecodable record: {}", e),
            }
        }
    }

    async fn apply_reading(
        &self,
        uplink: &Uplink,
        reading: DecodedReading,
        agg: &mut ResultAggregate,
    ) {
        match reading {
            DecodedReading::Sensor(reading) => {
                info!("Sensor reading: {:?}", reading);
                agg.sensors = Some(reading);
            }
            DecodedReading::Accelerometer(sample) => {
                info!("Accelerometer sample: {:?}", sample);
                agg.accelerometer_mut().acc_vals = Some(sample);
            }
            DecodedReading::BatteryCharge { charge, batt_level } => {
                info!("Modem charge: {} mAh ({:.1}%)", charge, batt_level);
                let report = agg.accelerometer_mut();
                report.modem_charge = Some(charge);
                report.batt_level = Some(batt_level);
            }
            DecodedReading::BatteryVoltage { volts } => {
                info!("Modem voltage: {} V", volts);
                agg.accelerometer_mut().modem_volt = Some(volts);
            }
            DecodedReading::WifiScan(scan) => self.resolve_wifi(uplink, scan, agg).await,
            DecodedReading::GnssScan(scan) => self.resolve_gnss(uplink, scan, agg).await,
        }
    }

    async fn resolve_wifi(&self, uplink: &Uplink, scan: WifiScanRequest, agg: &mut ResultAggregate) {
        let forward = ScanForward {
            msgtype: ScanKind::Wifi,
            payload: scan.payload,
            timestamp: scan
                .embedded_timestamp
                .map(|ts| ts as i64)
                .unwrap_or(uplink.timestamp_epoch),
        };
        let Some(result) = self.resolve_scan(uplink, &forward).await else {
            return;
        };
        if let Some(solution) = &result.position_solution {
            agg.wifi_location = Some(LocationReport {
                msgtype: "wifi",
                soltype: None,
                dev_eui: uplink.deveui_upper.clone(),
                latitude: solution.llh[0],
                longitude: solution.llh[1],
                altitude: solution.llh[2],
                acc: solution.accuracy,
                gdop: solution.gdop.unwrap_or(-1.0),
                timestamp: solution.timestamp,
            });
        } else {
            debug!("Wi-Fi scan returned no position solution");
        }
    }

    async fn resolve_gnss(&self, uplink: &Uplink, scan: GnssScanRequest, agg: &mut ResultAggregate) {
        let tag = scan.tag;
        info!("Received GNSS NAV msg from antenna type {:02X}", tag);
        let forward = ScanForward {
            msgtype: ScanKind::Gnss,
            payload: scan.payload,
            timestamp: uplink.timestamp_epoch,
        };
        let Some(result) = self.resolve_scan(uplink, &forward).await else {
            return;
        };
        if let Some(solution) = &result.position_solution {
            agg.insert_gnss(
                tag,
                LocationReport {
                    msgtype: "gnss",
                    soltype: Some(format!("{:02X}", tag)),
                    dev_eui: uplink.deveui_upper.clone(),
                    latitude: solution.llh[0],
                    longitude: solution.llh[1],
                    altitude: solution.llh[2],
                    acc: solution.accuracy,
                    gdop: solution.gdop.unwrap_or(-1.0),
                    timestamp: solution.timestamp,
                },
            );
        } else {
            debug!("GNSS scan returned no position solution");
        }
    }

    /// Second solver round trip for one scan record. The response may
    /// itself carry a downlink directive, relayed before the position
    /// solution is read. A failed scan contributes nothing and never
    /// fails the uplink.
    async fn resolve_scan(&self, uplink: &Uplink, forward: &ScanForward) -> Option<DeviceResult> {
        let raw = match self
            .solver
            .forward_scan(&uplink.deveui_lower, forward)
            .await
        {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Scan solver call failed (record skipped): {:#}", e);
                return None;
            }
        };
        let Some(result) = parse_device_result(&raw, &uplink.deveui_lower) else {
            warn!("Scan solver error: {}", raw);
            return None;
        };
        if let Some(directive) = &result.dnlink {
            self.relay_downlink(uplink, directive).await;
        }
        Some(result)
    }

    async fn relay_downlink(&self, uplink: &Uplink, directive: &DownlinkDirective) {
        info!(
            "Relaying downlink to {} (solver port {})",
            uplink.deveui_upper, directive.port
        );
        if let Err(e) = self
            .downlink
            .emit(&uplink.wireless_device_id, directive)
            .await
        {
            warn!("Downlink dispatch failed (ignored): {:#}", e);
        }
    }
}

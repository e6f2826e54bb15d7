//! Wifi scan results: one observation of a neighboring BSS.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// One observation of a neighbor BSS from a wifi scan.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct WifiScanEntry {
    #[serde(default)]
    pub ssid: Option<String>,
    #[serde(default)]
    pub bssid: String,
    /// Center frequency (MHz)
    #[serde(default)]
    pub frequency: u32,
    #[serde(default)]
    pub channel: Option<u32>,
    /// Received signal strength (dBm)
    #[serde(default)]
    pub signal: i32,
    /// Timing synchronization function value from the beacon
    #[serde(default)]
    pub tsf: Option<u64>,
    /// HT operation element (base64), present on 802.11n APs
    #[serde(default)]
    pub ht_oper: Option<String>,
    /// VHT operation element (base64), present on 802.11ac APs
    #[serde(default)]
    pub vht_oper: Option<String>,
    /// Ingest timestamp of the carrying record (Unix ms). Not part of the
    /// device payload; stamped during parsing.
    #[serde(default)]
    pub unix_time_ms: i64,
}

/// Parse the scan result list out of a wifiscan record payload, stamping each
/// entry with the record's ingest timestamp.
///
/// The scan list lives at `status.scan` (command result shape) or `scan`
/// (bare shape). Returns `None` when neither is present or the value is not
/// an array; individual entries that fail to deserialize are dropped with a
/// debug log, leaving the rest of the result intact.
pub fn parse_wifi_scan_entries(
    payload: &serde_json::Value,
    timestamp_ms: i64,
) -> Option<Vec<WifiScanEntry>> {
    let scan = payload
        .get("status")
        .and_then(|s| s.get("scan"))
        .or_else(|| payload.get("scan"))?
        .as_array()?;

    let mut entries = Vec::with_capacity(scan.len());
    for value in scan {
        match serde_json::from_value::<WifiScanEntry>(value.clone()) {
            Ok(mut entry) => {
                entry.unix_time_ms = timestamp_ms;
                entries.push(entry);
            }
            Err(e) => {
                debug!("Dropping malformed scan entry: {e}");
            }
        }
    }
    Some(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_command_result_shape() {
        let payload = serde_json::json!({
            "status": {
                "resultCode": 0,
                "scan": [
                    {"bssid": "11:22:33:44:55:66", "frequency": 2437, "signal": -61},
                    {"bssid": "11:22:33:44:55:77", "frequency": 5180, "signal": -70},
                ],
            },
        });
        let entries = parse_wifi_scan_entries(&payload, 1700000000000).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].signal, -61);
        assert!(entries.iter().all(|e| e.unix_time_ms == 1700000000000));
    }

    #[test]
    fn parses_bare_shape() {
        let payload = serde_json::json!({
            "scan": [{"bssid": "aa:aa:aa:aa:aa:aa", "frequency": 2412, "signal": -55}],
        });
        let entries = parse_wifi_scan_entries(&payload, 1).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn missing_scan_list_drops_record() {
        let payload = serde_json::json!({"status": {"resultCode": 1}});
        assert!(parse_wifi_scan_entries(&payload, 1).is_none());
        let payload = serde_json::json!({"scan": "nope"});
        assert!(parse_wifi_scan_entries(&payload, 1).is_none());
    }

    #[test]
    fn malformed_entry_does_not_poison_batch() {
        let payload = serde_json::json!({
            "scan": [
                {"bssid": "aa:aa:aa:aa:aa:aa", "frequency": 2412, "signal": -55},
                {"bssid": "bb:bb:bb:bb:bb:bb", "frequency": "not-a-number"},
            ],
        });
        let entries = parse_wifi_scan_entries(&payload, 1).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].bssid, "aa:aa:aa:aa:aa:aa");
    }
}

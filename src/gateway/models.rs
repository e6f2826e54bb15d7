//! Response models for the gateway, security, and provisioning services.

use serde::{Deserialize, Serialize};

use crate::types::PhyCapabilityMap;

/// A device as listed by the gateway's `devices` endpoint.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeviceWithStatus {
    pub serial_number: String,
    #[serde(default)]
    pub connected: bool,
    #[serde(default)]
    pub compatible: Option<String>,
}

/// Result of `device/{serial}/statistics?newest=true&limit=N`.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct StatisticsRecords {
    #[serde(default)]
    pub data: Vec<StatisticsRecord>,
}

/// One archived statistics record; `data` is the raw state payload.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsRecord {
    #[serde(default)]
    pub recorded: Option<i64>,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Result of `device/{serial}/capabilities`.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DeviceCapabilities {
    #[serde(default)]
    pub serial_number: Option<String>,
    pub capabilities: Capabilities,
}

/// Capabilities body; only the wifi phy map is of interest here.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Capabilities {
    #[serde(default)]
    pub wifi: PhyCapabilityMap,
}

/// Result of a device command (configure, wifiscan, script).
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct CommandInfo {
    #[serde(default, rename = "UUID")]
    pub uuid: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub results: Option<serde_json::Value>,
}

/// A service join/leave/keep-alive event from the `service_events` topic,
/// carrying endpoint URLs and the API key for private calls.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub id: Option<u64>,
    /// API key for service-to-service authentication
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub private_end_point: Option<String>,
    #[serde(default)]
    pub public_end_point: Option<String>,
}

/// Reply from the security service's `oauth2` endpoint.
#[derive(Deserialize, Serialize, Clone, Debug)]
pub struct TokenReply {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// Reply from the security service's `systemEndpoints` endpoint.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct SystemEndpointList {
    #[serde(default)]
    pub endpoints: Vec<SystemEndpoint>,
}

/// One discovered service endpoint.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct SystemEndpoint {
    /// Service type, e.g. "owgw", "owprov"
    #[serde(rename = "type")]
    pub service: String,
    pub uri: String,
}

/// Reply from the provisioning service's `inventory` endpoint.
#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct InventoryTagList {
    #[serde(default)]
    pub taglist: Vec<InventoryTag>,
}

/// One provisioned device. `venue` is the zone the device belongs to.
#[derive(Deserialize, Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct InventoryTag {
    pub serial_number: String,
    #[serde(default)]
    pub venue: Option<String>,
    /// RRM participation: "on", "off", or "inherit" (treated as on)
    #[serde(default)]
    pub rrm: Option<String>,
}

impl InventoryTag {
    /// Whether this device participates in RRM. Anything other than an
    /// explicit "off"/"no" opts in.
    pub fn rrm_enabled(&self) -> bool {
        !matches!(self.rrm.as_deref(), Some("off") | Some("no"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inventory_tag_rrm_flag() {
        let tag: InventoryTag = serde_json::from_value(serde_json::json!({
            "serialNumber": "aabbccddeeff", "venue": "hq", "rrm": "inherit",
        }))
        .unwrap();
        assert!(tag.rrm_enabled());

        let tag: InventoryTag = serde_json::from_value(serde_json::json!({
            "serialNumber": "aabbccddeeff", "rrm": "off",
        }))
        .unwrap();
        assert!(!tag.rrm_enabled());
    }

    #[test]
    fn command_info_parses_gateway_reply() {
        let info: CommandInfo = serde_json::from_value(serde_json::json!({
            "UUID": "d3adb33f", "serialNumber": "aabbccddeeff", "errorCode": 0,
        }))
        .unwrap();
        assert_eq!(info.uuid.as_deref(), Some("d3adb33f"));
        assert_eq!(info.error_code, Some(0));
    }
}

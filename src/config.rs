//! Service configuration, loaded from a JSON file at startup.
//!
//! Every field has a serde default so a minimal config file (gateway
//! credentials plus zone schedules) is enough to run.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::logging::LogConfig;
use crate::prelude::*;
use crate::Error;

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub modeler: ModelerParams,
    #[serde(default)]
    pub gateway: GatewayParams,
    #[serde(default)]
    pub api: ApiParams,
    #[serde(default)]
    pub prov_monitor: ProvMonitorParams,
    #[serde(default)]
    pub scheduler: SchedulerParams,
    #[serde(default)]
    pub logging: LogConfig,
}

impl ServiceConfig {
    /// Load and parse the config file. A missing file is fatal at startup.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&contents)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

/// Rolling buffer sizes for the data model.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelerParams {
    /// Number of latest states buffered per device
    #[serde(default = "default_state_buffer_size")]
    pub state_buffer_size: usize,
    /// Number of latest wifi scan results buffered per device
    #[serde(default = "default_wifi_scan_buffer_size")]
    pub wifi_scan_buffer_size: usize,
}

fn default_state_buffer_size() -> usize {
    10
}

fn default_wifi_scan_buffer_size() -> usize {
    10
}

impl Default for ModelerParams {
    fn default() -> Self {
        Self {
            state_buffer_size: default_state_buffer_size(),
            wifi_scan_buffer_size: default_wifi_scan_buffer_size(),
        }
    }
}

/// Southbound gateway connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayParams {
    /// uCentralSec endpoint used for login and service discovery
    #[serde(default)]
    pub sec_endpoint: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Use public (operator-facing) endpoints instead of private
    /// service-to-service ones
    #[serde(default)]
    pub use_public_endpoints: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Wifi scans hold the command channel far longer than config pushes
    #[serde(default = "default_wifiscan_timeout_secs")]
    pub wifiscan_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    5
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_wifiscan_timeout_secs() -> u64 {
    90
}

impl Default for GatewayParams {
    fn default() -> Self {
        Self {
            sec_endpoint: String::new(),
            username: String::new(),
            password: String::new(),
            use_public_endpoints: false,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            wifiscan_timeout_secs: default_wifiscan_timeout_secs(),
        }
    }
}

impl GatewayParams {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn wifiscan_timeout(&self) -> Duration {
        Duration::from_secs(self.wifiscan_timeout_secs)
    }
}

/// Northbound REST settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiParams {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:16790".to_string()
}

impl Default for ApiParams {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

/// Provisioning reconciliation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvMonitorParams {
    #[serde(default = "default_prov_interval_secs")]
    pub interval_secs: u64,
}

fn default_prov_interval_secs() -> u64 {
    300
}

impl Default for ProvMonitorParams {
    fn default() -> Self {
        Self {
            interval_secs: default_prov_interval_secs(),
        }
    }
}

/// Per-zone optimization schedules.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SchedulerParams {
    #[serde(default)]
    pub zones: Vec<ZoneSchedule>,
}

/// Schedule and algorithm selection for one zone. Unset categories fall back
/// to the registry defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ZoneSchedule {
    pub zone: String,
    /// Seconds between scheduled runs of each category
    #[serde(default = "default_zone_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub tpc: Option<AlgorithmSelection>,
    #[serde(default)]
    pub channel: Option<AlgorithmSelection>,
    #[serde(default)]
    pub client_steering: Option<AlgorithmSelection>,
}

fn default_zone_interval_secs() -> u64 {
    86_400
}

/// An algorithm ID plus its (string-typed) arguments.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AlgorithmSelection {
    pub mode: String,
    #[serde(default)]
    pub args: BTreeMap<String, String>,
}

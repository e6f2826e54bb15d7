//! Southbound client for the uCentral device-gateway and its sibling
//! security/provisioning services.

mod client;
mod models;

pub use client::*;
pub use models::*;

use async_trait::async_trait;

use crate::prelude::*;

/// Object-safe seam to the device-gateway, so ingest and apply paths can be
/// exercised against test doubles.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Whether login and endpoint discovery have completed.
    fn is_initialized(&self) -> bool;

    /// List all devices known to the gateway.
    async fn get_devices(&self) -> Result<Vec<DeviceWithStatus>>;

    /// Fetch the newest `limit` statistics records for a device.
    async fn get_latest_stats(&self, serial: &str, limit: usize) -> Result<StatisticsRecords>;

    /// Fetch a device's phy capabilities.
    async fn get_capabilities(&self, serial: &str) -> Result<DeviceCapabilities>;

    /// Launch a wifi scan on a device. Runs far longer than other commands.
    async fn wifi_scan(&self, serial: &str, verbose: bool) -> Result<CommandInfo>;

    /// Push a configuration delta to a device.
    async fn configure(
        &self,
        serial: &str,
        configuration: serde_json::Value,
    ) -> Result<CommandInfo>;

    /// Run a script command on a device.
    async fn run_script(&self, serial: &str, script: serde_json::Value) -> Result<CommandInfo>;

    /// Fetch the RRM-relevant provisioning inventory.
    async fn get_prov_inventory_for_rrm(&self) -> Result<Vec<InventoryTag>>;
}

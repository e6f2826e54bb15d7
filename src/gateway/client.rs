//! HTTP implementation of [`GatewayClient`] against the uCentral services.
//!
//! Supports both public endpoints (operator-style: oauth2 login against the
//! security service, bearer token on every call, `systemEndpoints`
//! discovery) and private endpoints (service-to-service: URLs and API keys
//! learned from `service_events` records).

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::{debug, info, warn};

use crate::config::GatewayParams;
use crate::prelude::*;
use crate::req::HttpClient;
use crate::Error;

use super::{
    CommandInfo, DeviceCapabilities, DeviceWithStatus, GatewayClient, InventoryTag,
    InventoryTagList, ServiceEvent, StatisticsRecords, SystemEndpointList, TokenReply,
};

/// Security service name in discovery records.
pub const OWSEC_SERVICE: &str = "owsec";
/// Gateway service name in discovery records.
pub const OWGW_SERVICE: &str = "owgw";
/// Provisioning service name in discovery records.
pub const OWPROV_SERVICE: &str = "owprov";

/// Our service name, sent on private service-to-service calls.
const INTERNAL_NAME: &str = "owrrm";

#[derive(Debug, Clone, Default)]
struct ServiceEndpoint {
    public_url: Option<String>,
    private_url: Option<String>,
    api_key: Option<String>,
}

/// uCentral gateway client.
pub struct UCentralGatewayClient {
    http: HttpClient,
    params: GatewayParams,
    endpoints: RwLock<HashMap<String, ServiceEndpoint>>,
    access_token: RwLock<Option<String>>,
}

impl UCentralGatewayClient {
    pub fn new(params: GatewayParams, verify_ssl: bool) -> Result<Self> {
        let http = HttpClient::new(
            params.connect_timeout(),
            params.request_timeout(),
            verify_ssl,
        )?;
        Ok(Self {
            http,
            params,
            endpoints: RwLock::new(HashMap::new()),
            access_token: RwLock::new(None),
        })
    }

    /// Log in against the security service and discover sibling endpoints.
    /// Only needed in public-endpoint mode.
    pub async fn login(&self) -> Result<()> {
        let url = format!("{}/api/v1/oauth2", self.params.sec_endpoint);
        let body = serde_json::json!({
            "userId": self.params.username,
            "password": self.params.password,
        });
        let reply = self.http.post(&url, body, HeaderMap::new(), None).await?;
        let token: TokenReply = serde_json::from_str(&reply)?;
        *self.access_token.write().expect("token lock poisoned") = Some(token.access_token);
        info!("Gateway login succeeded");

        self.discover_endpoints().await
    }

    async fn discover_endpoints(&self) -> Result<()> {
        let url = format!("{}/api/v1/systemEndpoints", self.params.sec_endpoint);
        let reply = self.http.get(&url, &[], self.auth_headers(OWSEC_SERVICE)?).await?;
        let list: SystemEndpointList = serde_json::from_str(&reply)?;
        let mut endpoints = self.endpoints.write().expect("endpoint lock poisoned");
        for endpoint in list.endpoints {
            debug!(service = %endpoint.service, uri = %endpoint.uri, "Discovered endpoint");
            endpoints
                .entry(endpoint.service)
                .or_default()
                .public_url = Some(endpoint.uri);
        }
        Ok(())
    }

    /// Record a service endpoint learned from the `service_events` topic.
    /// Join and keep-alive events upsert; leave events are ignored (a stale
    /// endpoint beats none until the replacement joins).
    pub fn handle_service_event(&self, service: &str, event: &ServiceEvent) {
        if event.event_type == "leave" {
            return;
        }
        let mut endpoints = self.endpoints.write().expect("endpoint lock poisoned");
        let entry = endpoints.entry(service.to_string()).or_default();
        entry.private_url = event.private_end_point.clone();
        if entry.public_url.is_none() {
            entry.public_url = event.public_end_point.clone();
        }
        if event.key.is_some() {
            entry.api_key = event.key.clone();
        }
    }

    fn service_url(&self, service: &str, path: &str) -> Result<String> {
        let endpoints = self.endpoints.read().expect("endpoint lock poisoned");
        let endpoint = endpoints
            .get(service)
            .ok_or_else(|| Error::ServiceNotDiscovered(service.to_string()))?;
        let base = if self.params.use_public_endpoints {
            endpoint.public_url.as_ref()
        } else {
            endpoint.private_url.as_ref().or(endpoint.public_url.as_ref())
        };
        let base = base.ok_or_else(|| Error::ServiceNotDiscovered(service.to_string()))?;
        Ok(format!("{}/api/v1/{}", base.trim_end_matches('/'), path))
    }

    fn auth_headers(&self, service: &str) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if self.params.use_public_endpoints {
            let token = self.access_token.read().expect("token lock poisoned");
            let token = token.as_ref().ok_or(Error::NotAuthenticated)?;
            headers.insert(
                reqwest::header::AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {token}"))
                    .map_err(|e| Error::GenericRequest(e.to_string()))?,
            );
        } else {
            let endpoints = self.endpoints.read().expect("endpoint lock poisoned");
            if let Some(key) = endpoints.get(service).and_then(|e| e.api_key.as_ref()) {
                headers.insert(
                    "X-API-KEY",
                    HeaderValue::from_str(key)
                        .map_err(|e| Error::GenericRequest(e.to_string()))?,
                );
            }
            headers.insert("X-INTERNAL-NAME", HeaderValue::from_static(INTERNAL_NAME));
        }
        Ok(headers)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        service: &str,
        path: &str,
        parameters: &[(&str, String)],
    ) -> Result<T> {
        let url = self.service_url(service, path)?;
        let reply = self
            .http
            .get(&url, parameters, self.auth_headers(service)?)
            .await?;
        Ok(serde_json::from_str(&reply)?)
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        service: &str,
        path: &str,
        body: serde_json::Value,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let url = self.service_url(service, path)?;
        let reply = self
            .http
            .post(&url, body, self.auth_headers(service)?, timeout)
            .await?;
        Ok(serde_json::from_str(&reply)?)
    }
}

#[async_trait]
impl GatewayClient for UCentralGatewayClient {
    fn is_initialized(&self) -> bool {
        let endpoints = self.endpoints.read().expect("endpoint lock poisoned");
        let has_gateway = endpoints
            .get(OWGW_SERVICE)
            .map(|e| e.public_url.is_some() || e.private_url.is_some())
            .unwrap_or(false);
        if !has_gateway {
            return false;
        }
        if self.params.use_public_endpoints {
            self.access_token
                .read()
                .expect("token lock poisoned")
                .is_some()
        } else {
            true
        }
    }

    async fn get_devices(&self) -> Result<Vec<DeviceWithStatus>> {
        #[derive(serde::Deserialize)]
        struct DeviceList {
            #[serde(default, rename = "devicesWithStatus")]
            devices_with_status: Vec<DeviceWithStatus>,
        }
        let list: DeviceList = self
            .get_json(
                OWGW_SERVICE,
                "devices",
                &[("deviceWithStatus", "true".to_string())],
            )
            .await?;
        Ok(list.devices_with_status)
    }

    async fn get_latest_stats(&self, serial: &str, limit: usize) -> Result<StatisticsRecords> {
        self.get_json(
            OWGW_SERVICE,
            &format!("device/{serial}/statistics"),
            &[
                ("newest", "true".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn get_capabilities(&self, serial: &str) -> Result<DeviceCapabilities> {
        self.get_json(OWGW_SERVICE, &format!("device/{serial}/capabilities"), &[])
            .await
    }

    async fn wifi_scan(&self, serial: &str, verbose: bool) -> Result<CommandInfo> {
        let body = serde_json::json!({
            "serialNumber": serial,
            "verbose": verbose,
        });
        self.post_json(
            OWGW_SERVICE,
            &format!("device/{serial}/wifiscan"),
            body,
            Some(self.params.wifiscan_timeout()),
        )
        .await
    }

    async fn configure(
        &self,
        serial: &str,
        configuration: serde_json::Value,
    ) -> Result<CommandInfo> {
        let body = serde_json::json!({
            "serialNumber": serial,
            "UUID": 1,
            "when": 0,
            "configuration": configuration,
        });
        self.post_json(OWGW_SERVICE, &format!("device/{serial}/configure"), body, None)
            .await
    }

    async fn run_script(&self, serial: &str, script: serde_json::Value) -> Result<CommandInfo> {
        self.post_json(OWGW_SERVICE, &format!("device/{serial}/script"), script, None)
            .await
    }

    async fn get_prov_inventory_for_rrm(&self) -> Result<Vec<InventoryTag>> {
        let list: InventoryTagList = self
            .get_json(
                OWPROV_SERVICE,
                "inventory",
                &[("rrmOnly", "true".to_string())],
            )
            .await
            .map_err(|e| {
                warn!("Provisioning inventory fetch failed: {e}");
                e
            })?;
        Ok(list.taglist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> UCentralGatewayClient {
        UCentralGatewayClient::new(GatewayParams::default(), true).unwrap()
    }

    fn join_event(private: &str, key: &str) -> ServiceEvent {
        serde_json::from_value(serde_json::json!({
            "type": "join",
            "privateEndPoint": private,
            "key": key,
        }))
        .unwrap()
    }

    #[test]
    fn initialization_requires_a_gateway_endpoint() {
        let client = client();
        assert!(!client.is_initialized());
        client.handle_service_event(
            OWGW_SERVICE,
            &join_event("https://owgw.internal:16002", "secret"),
        );
        assert!(client.is_initialized());
    }

    #[test]
    fn service_urls_come_from_events_in_private_mode() {
        let client = client();
        client.handle_service_event(
            OWGW_SERVICE,
            &join_event("https://owgw.internal:16002/", "secret"),
        );
        let url = client.service_url(OWGW_SERVICE, "devices").unwrap();
        assert_eq!(url, "https://owgw.internal:16002/api/v1/devices");
        assert!(matches!(
            client.service_url(OWPROV_SERVICE, "inventory"),
            Err(Error::ServiceNotDiscovered(_))
        ));
    }

    #[test]
    fn leave_events_keep_the_last_known_endpoint() {
        let client = client();
        client.handle_service_event(
            OWGW_SERVICE,
            &join_event("https://owgw.internal:16002", "secret"),
        );
        let leave: ServiceEvent =
            serde_json::from_value(serde_json::json!({"type": "leave"})).unwrap();
        client.handle_service_event(OWGW_SERVICE, &leave);
        assert!(client.is_initialized());
    }

    #[test]
    fn private_mode_sends_api_key_headers() {
        let client = client();
        client.handle_service_event(
            OWGW_SERVICE,
            &join_event("https://owgw.internal:16002", "secret"),
        );
        let headers = client.auth_headers(OWGW_SERVICE).unwrap();
        assert_eq!(headers.get("X-API-KEY").unwrap(), "secret");
        assert_eq!(headers.get("X-INTERNAL-NAME").unwrap(), "owrrm");
    }
}

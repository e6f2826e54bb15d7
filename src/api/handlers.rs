//! Operator endpoint handlers.
//!
//! All endpoints speak JSON; non-2xx responses carry a human-readable
//! message in the body.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use crate::modeler::DataModel;
use crate::optimizers::{AlgorithmCategory, AlgorithmDescriptor};
use crate::registry::{DeviceConfig, Topology};
use crate::scheduler::RunOutcome;
use crate::Error;

use super::ApiState;

/// Error envelope: status code plus a human-readable message.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, self.1).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        let status = match &e {
            Error::AlreadyRunning { .. } => StatusCode::CONFLICT,
            Error::UnknownZone(_) | Error::UnknownAlgorithm(_) => StatusCode::BAD_REQUEST,
            Error::NoDeviceData(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError(status, e.to_string())
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/currentModel", get(get_current_model))
        .route("/api/v1/getDeviceConfig", get(get_device_config))
        .route("/api/v1/setDeviceApConfig", put(set_device_ap_config))
        .route("/api/v1/setDeviceZoneConfig", put(set_device_zone_config))
        .route(
            "/api/v1/setDeviceNetworkConfig",
            put(set_device_network_config),
        )
        .route("/api/v1/topology", get(get_topology).put(put_topology))
        .route("/api/v1/optimizeChannel", post(optimize_channel))
        .route("/api/v1/optimizeTxPower", post(optimize_tx_power))
        .route("/api/v1/runRRM", post(run_rrm))
        .route("/api/v1/algorithms", get(get_algorithms))
        .with_state(state)
}

async fn get_current_model(State(state): State<ApiState>) -> Json<DataModel> {
    Json(state.modeler.data_model_copy())
}

#[derive(Deserialize)]
struct SerialQuery {
    serial: String,
}

async fn get_device_config(
    State(state): State<ApiState>,
    Query(query): Query<SerialQuery>,
) -> Result<Json<DeviceConfig>, ApiError> {
    state
        .registry
        .effective_config(&query.serial)
        .map(Json)
        .ok_or_else(|| {
            ApiError(
                StatusCode::NOT_FOUND,
                format!("unknown device: {}", query.serial),
            )
        })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApConfigBody {
    serial_number: String,
    config: DeviceConfig,
}

async fn set_device_ap_config(
    State(state): State<ApiState>,
    Json(body): Json<ApConfigBody>,
) -> StatusCode {
    state.registry.set_ap_config(&body.serial_number, body.config);
    StatusCode::OK
}

#[derive(Deserialize)]
struct ZoneConfigBody {
    zone: String,
    config: DeviceConfig,
}

async fn set_device_zone_config(
    State(state): State<ApiState>,
    Json(body): Json<ZoneConfigBody>,
) -> StatusCode {
    state.registry.set_zone_config(&body.zone, body.config);
    StatusCode::OK
}

#[derive(Deserialize)]
struct NetworkConfigBody {
    config: DeviceConfig,
}

async fn set_device_network_config(
    State(state): State<ApiState>,
    Json(body): Json<NetworkConfigBody>,
) -> StatusCode {
    state.registry.set_network_config(body.config);
    StatusCode::OK
}

async fn get_topology(State(state): State<ApiState>) -> Json<Topology> {
    Json(state.registry.topology())
}

async fn put_topology(
    State(state): State<ApiState>,
    Json(topology): Json<Topology>,
) -> StatusCode {
    state.registry.set_topology(topology);
    StatusCode::OK
}

#[derive(Deserialize)]
struct OptimizeQuery {
    zone: String,
    mode: Option<String>,
    #[serde(rename = "dryRun", default)]
    dry_run: bool,
}

async fn optimize_channel(
    State(state): State<ApiState>,
    Query(query): Query<OptimizeQuery>,
) -> Result<Json<RunOutcome>, ApiError> {
    let outcome = state
        .scheduler
        .trigger(
            &query.zone,
            AlgorithmCategory::Channel,
            query.mode.as_deref(),
            None,
            query.dry_run,
        )
        .await?;
    Ok(Json(outcome))
}

async fn optimize_tx_power(
    State(state): State<ApiState>,
    Query(query): Query<OptimizeQuery>,
) -> Result<Json<RunOutcome>, ApiError> {
    let outcome = state
        .scheduler
        .trigger(
            &query.zone,
            AlgorithmCategory::Tpc,
            query.mode.as_deref(),
            None,
            query.dry_run,
        )
        .await?;
    Ok(Json(outcome))
}

#[derive(Deserialize)]
struct RunRrmQuery {
    zone: String,
    #[serde(rename = "dryRun", default)]
    dry_run: bool,
}

async fn run_rrm(
    State(state): State<ApiState>,
    Query(query): Query<RunRrmQuery>,
) -> Result<Json<Vec<RunOutcome>>, ApiError> {
    let outcomes = state.scheduler.run_all(&query.zone, query.dry_run).await?;
    Ok(Json(outcomes))
}

async fn get_algorithms(State(state): State<ApiState>) -> Json<Vec<AlgorithmDescriptor>> {
    Json(state.algorithms.descriptors().copied().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_mapping_follows_kind() {
        let e: ApiError = Error::AlreadyRunning {
            zone: "z".to_string(),
            category: "TPC".to_string(),
        }
        .into();
        assert_eq!(e.0, StatusCode::CONFLICT);

        let e: ApiError = Error::UnknownZone("z".to_string()).into();
        assert_eq!(e.0, StatusCode::BAD_REQUEST);

        let e: ApiError = Error::GenericRequest("io".to_string()).into();
        assert_eq!(e.0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}

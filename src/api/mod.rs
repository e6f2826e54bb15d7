//! Northbound REST surface for operators.

mod handlers;

pub use handlers::router;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::modeler::Modeler;
use crate::optimizers::AlgorithmRegistry;
use crate::prelude::*;
use crate::registry::DeviceRegistry;
use crate::scheduler::RrmScheduler;
use crate::Error;

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub modeler: Arc<Modeler>,
    pub registry: Arc<DeviceRegistry>,
    pub scheduler: Arc<RrmScheduler>,
    pub algorithms: Arc<AlgorithmRegistry>,
}

/// Bind and serve the operator API until shutdown.
pub async fn serve(
    bind_addr: String,
    state: ApiState,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| Error::Config(format!("cannot bind {bind_addr}: {e}")))?;
    info!("Operator API listening on {bind_addr}");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown.changed().await;
        })
        .await
        .map_err(|e| Error::GenericRequest(e.to_string()))
}

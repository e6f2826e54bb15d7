//! OpenWiFi RRM service binary.
//!
//! Wires the ingest pipeline, scheduler, provisioning monitor, and operator
//! API together, or runs a single algorithm across all zones with
//! `--run-once`.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use owrrm::api::{self, ApiState};
use owrrm::applier::ConfigApplier;
use owrrm::config::ServiceConfig;
use owrrm::gateway::{GatewayClient, UCentralGatewayClient};
use owrrm::logging::init_logging;
use owrrm::modeler::Modeler;
use owrrm::optimizers::clientsteering::ClientSteeringState;
use owrrm::optimizers::AlgorithmRegistry;
use owrrm::provisioning::ProvMonitor;
use owrrm::registry::DeviceRegistry;
use owrrm::scheduler::RrmScheduler;

#[derive(Parser)]
#[command(name = "rrm_service", version, about = "OpenWiFi RRM service", long_about = None)]
struct Cli {
    /// Path to the JSON config file
    #[arg(short, long, default_value = "rrm.json")]
    config: PathBuf,

    /// Verify gateway TLS certificates
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    verify_ssl: bool,

    /// Run the given algorithm once for every zone, apply, and exit
    #[arg(long, value_name = "ALGORITHM_ID")]
    run_once: Option<String>,

    /// Override the log filter (same syntax as RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ServiceConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config: {e}");
            return ExitCode::FAILURE;
        }
    };

    let _log_guards = match init_logging(&config.logging, cli.log_level.as_deref()) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };

    let gateway = match UCentralGatewayClient::new(config.gateway.clone(), cli.verify_ssl) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to build gateway client: {e}");
            return ExitCode::FAILURE;
        }
    };
    let gateway_dyn: Arc<dyn GatewayClient> = gateway.clone();

    let registry = Arc::new(DeviceRegistry::new());
    let modeler = Arc::new(Modeler::new(
        config.modeler.clone(),
        registry.clone(),
        gateway_dyn.clone(),
    ));
    let steering_state = Arc::new(ClientSteeringState::new());
    let algorithms = Arc::new(AlgorithmRegistry::standard());
    let applier = Arc::new(ConfigApplier::new(modeler.clone(), gateway_dyn.clone()));
    let scheduler = Arc::new(RrmScheduler::new(
        config.scheduler.clone(),
        modeler.clone(),
        registry.clone(),
        algorithms.clone(),
        steering_state,
        applier,
    ));
    let prov_monitor = Arc::new(ProvMonitor::new(
        config.prov_monitor.clone(),
        registry.clone(),
        gateway_dyn,
        modeler.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Public-endpoint mode needs a login before anything can talk to the
    // gateway; keep retrying until it succeeds or we shut down.
    if config.gateway.use_public_endpoints {
        let gateway = gateway.clone();
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                match gateway.login().await {
                    Ok(()) => break,
                    Err(e) => warn!("Gateway login failed, retrying: {e}"),
                }
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(Duration::from_secs(10)) => {}
                }
            }
        });
    }

    if let Some(algorithm_id) = cli.run_once {
        return run_once(
            &algorithm_id,
            &algorithms,
            &registry,
            &modeler,
            &scheduler,
            &prov_monitor,
            shutdown_rx,
        )
        .await;
    }

    // Long-running mode: ingest worker, provisioning reconciler, scheduled
    // jobs, operator API.
    let modeler_task = tokio::spawn(modeler.clone().run(shutdown_rx.clone()));
    let prov_task = tokio::spawn(prov_monitor.run(shutdown_rx.clone()));
    scheduler.clone().spawn_jobs(shutdown_rx.clone());

    let api_state = ApiState {
        modeler,
        registry,
        scheduler,
        algorithms,
    };
    let api_task = tokio::spawn(api::serve(
        config.api.bind_addr.clone(),
        api_state,
        shutdown_rx,
    ));

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => error!("Failed to listen for shutdown signal: {e}"),
    }
    let _ = shutdown_tx.send(true);

    for (name, task) in [
        ("modeler", modeler_task),
        ("prov-monitor", prov_task),
    ] {
        if let Err(e) = task.await {
            error!("{name} task panicked: {e}");
        }
    }
    match api_task.await {
        Ok(Err(e)) => {
            error!("API server error: {e}");
            return ExitCode::FAILURE;
        }
        Err(e) => error!("API task panicked: {e}"),
        Ok(Ok(())) => {}
    }

    ExitCode::SUCCESS
}

/// One-shot mode: reconcile the registry, backfill the model, run the named
/// algorithm for every zone, print the outcomes, exit.
async fn run_once(
    algorithm_id: &str,
    algorithms: &Arc<AlgorithmRegistry>,
    registry: &Arc<DeviceRegistry>,
    modeler: &Arc<Modeler>,
    scheduler: &Arc<RrmScheduler>,
    prov_monitor: &Arc<ProvMonitor>,
    mut shutdown: watch::Receiver<bool>,
) -> ExitCode {
    let Some(descriptor) = algorithms.descriptor(algorithm_id) else {
        error!("Unknown algorithm: {algorithm_id}");
        return ExitCode::FAILURE;
    };
    let category = descriptor.category;

    if let Err(e) = prov_monitor.reconcile_once().await {
        warn!("Provisioning reconciliation failed: {e}");
    }
    modeler.backfill(&mut shutdown).await;

    let mut failures = 0;
    for zone in registry.zones() {
        match scheduler
            .trigger(&zone, category, Some(algorithm_id), None, false)
            .await
        {
            Ok(outcome) => match serde_json::to_string_pretty(&outcome) {
                Ok(rendered) => println!("{rendered}"),
                Err(e) => error!("Zone {zone}: failed to render outcome: {e}"),
            },
            Err(e) => {
                error!("Zone {zone}: run failed: {e}");
                failures += 1;
            }
        }
    }
    if failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

//! Structured logging setup.
//!
//! One stdout stream plus an optional daily-rotated file stream. Component
//! log targets follow the module tree, so operators can filter per subsystem:
//!
//! ```bash
//! # Debug only the modeler
//! RUST_LOG=owrrm::modeler=debug rrm_service --config rrm.json
//!
//! # Warn for all, debug for the optimizers
//! RUST_LOG=warn,owrrm::optimizers=debug rrm_service --config rrm.json
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

/// Log output format.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human-readable format with colors (default for development)
    #[default]
    Pretty,
    /// JSON format (best for log aggregation)
    Json,
    /// Compact single-line format
    Compact,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LogConfig {
    /// Base log level when RUST_LOG is unset
    #[serde(default = "default_level")]
    pub level: String,

    /// Format for stdout logging
    #[serde(default)]
    pub stdout_format: LogFormat,

    /// Directory for the rotated file stream; `None` disables file logging
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            stdout_format: LogFormat::default(),
            log_dir: None,
        }
    }
}

fn base_filter(config: &LogConfig, env_filter_override: Option<&str>) -> EnvFilter {
    if let Some(filter) = env_filter_override {
        EnvFilter::new(filter)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(&config.level)
                .add_directive("hyper=warn".parse().expect("static directive"))
                .add_directive("reqwest=warn".parse().expect("static directive"))
        })
    }
}

/// Initialize logging based on configuration.
///
/// Returns the `WorkerGuard`s that must be kept alive for the duration of
/// the program to ensure file logs are flushed.
pub fn init_logging(
    config: &LogConfig,
    env_filter_override: Option<&str>,
) -> Result<Vec<WorkerGuard>, Box<dyn std::error::Error>> {
    let mut guards = Vec::new();
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let filter = base_filter(config, env_filter_override);
    layers.push(match config.stdout_format {
        LogFormat::Pretty => fmt::layer().with_filter(filter).boxed(),
        LogFormat::Json => fmt::layer().json().with_filter(filter).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_filter(filter).boxed(),
    });

    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;
        let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, "rrm.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        guards.push(guard);

        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .json()
                .with_filter(EnvFilter::new(&config.level))
                .boxed(),
        );
    }

    tracing_subscriber::registry().with(layers).init();
    Ok(guards)
}

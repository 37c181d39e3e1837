//! Subscriber setup: stdout in pretty or JSON form, optional daily log file,
//! optional OpenTelemetry export

use crate::config::{DaemonConfig, LogFormat};
use crate::telemetry;
use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};
use tracing_subscriber::Registry;

const DEFAULT_FILTER: &str = "chansync=info";
const LOG_FILE_PREFIX: &str = "chansync.log";

type Filtered = Layered<EnvFilter, Registry>;
type BoxedLayer = Box<dyn Layer<Filtered> + Send + Sync>;

/// Install the global subscriber. Keep the returned guard alive for the
/// life of the process or buffered file output is lost.
pub fn init(config: &DaemonConfig) -> Result<Option<WorkerGuard>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    let mut layers: Vec<BoxedLayer> = Vec::new();

    layers.push(match config.log_format {
        // Production: JSON structured logging
        LogFormat::Json => fmt::layer().json().boxed(),
        // Development: Pretty formatting with colors
        LogFormat::Pretty => fmt::layer().pretty().boxed(),
    });

    let guard = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            layers.push(
                fmt::layer()
                    .json()
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            );
            Some(guard)
        }
        None => None,
    };

    // Failure to build the exporter must not stop the daemon
    let otel_error = match telemetry::layer::<Filtered>() {
        Ok(Some(layer)) => {
            layers.push(layer);
            None
        }
        Ok(None) => None,
        Err(e) => Some(e),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(e) = otel_error {
        tracing::warn!(error = ?e, "Failed to initialize OpenTelemetry (continuing without it)");
    } else if telemetry::requested() && cfg!(not(feature = "telemetry")) {
        tracing::warn!("OpenTelemetry endpoint set but feature 'telemetry' not enabled");
    }

    Ok(guard)
}

//! # Structured Logging Module
//!
//! Environment-aware structured logging that writes to the console and to a
//! JSON log file, for following sensor, operator and action activity across
//! many concurrently scheduled tasks.

use crate::config::ConfigManager;
use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Holds the file writer's guard for the life of the process
static FILE_GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Log directory, default level and file name for one process
#[derive(Debug, Clone, PartialEq, Eq)]
struct LogSettings {
    environment: String,
    default_level: &'static str,
    log_dir: PathBuf,
}

impl LogSettings {
    fn for_environment(environment: String) -> Self {
        let default_level = if environment == "production" { "info" } else { "debug" };
        Self {
            environment,
            default_level,
            log_dir: PathBuf::from("log"),
        }
    }

    fn file_name(&self) -> String {
        format!(
            "{}.{}.{}.log",
            self.environment,
            process::id(),
            Utc::now().format("%Y%m%d_%H%M%S")
        )
    }

    /// `RUST_LOG` wins over the environment default
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.default_level))
    }
}

/// Console plus JSON file logging, set up once per process
///
/// The file layer is skipped when the log directory cannot be created. An
/// already installed global subscriber is left in place.
pub fn init_structured_logging() {
    FILE_GUARD.get_or_init(|| {
        let settings = LogSettings::for_environment(ConfigManager::detect_environment());

        let (file_layer, guard) = match fs::create_dir_all(&settings.log_dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::never(&settings.log_dir, settings.file_name());
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_ansi(false)
                    .with_thread_ids(true)
                    .with_filter(settings.filter());
                (Some(layer), Some(guard))
            }
            Err(_) => (None, None),
        };

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_filter(settings.filter());

        let installed = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer)
            .try_init()
            .is_ok();

        tracing::info!(
            pid = process::id(),
            environment = %settings.environment,
            log_dir = %settings.log_dir.display(),
            installed = installed,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
        guard
    });
}

/// Log structured data for action lifecycle operations
pub fn log_action_operation(
    operation: &str,
    cluster_id: &str,
    action_id: Option<&str>,
    action_name: Option<&str>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        cluster_id = %cluster_id,
        action_id = action_id,
        action_name = action_name,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🎬 ACTION_OPERATION"
    );
}

/// Log structured data for sensor passes
pub fn log_sensor_operation(
    sensor: &str,
    cluster_id: &str,
    status: &str,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        sensor = %sensor,
        cluster_id = %cluster_id,
        status = %status,
        duration_ms = duration_ms,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "📡 SENSOR_OPERATION"
    );
}

/// Log structured data for operator passes
pub fn log_operator_operation(
    operator: &str,
    cluster_id: &str,
    status: &str,
    dispatched: usize,
    details: Option<&str>,
) {
    tracing::info!(
        operator = %operator,
        cluster_id = %cluster_id,
        status = %status,
        dispatched = dispatched,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🧭 OPERATOR_OPERATION"
    );
}

/// Log structured data for coordination store operations
pub fn log_coordination_operation(
    operation: &str,
    target: &str,
    path: Option<&str>,
    status: &str,
    duration_ms: Option<u64>,
) {
    tracing::info!(
        operation = %operation,
        ensemble = %target,
        path = path,
        status = %status,
        duration_ms = duration_ms,
        timestamp = %Utc::now().to_rfc3339(),
        "🔗 COORDINATION_OPERATION"
    );
}

/// Log an alert as it is handed to the alert collaborator
pub fn log_alert(cluster_id: &str, level: &str, title: &str, body: &str) {
    tracing::warn!(
        cluster_id = %cluster_id,
        level = %level,
        title = %title,
        body = %body,
        timestamp = %Utc::now().to_rfc3339(),
        "🚨 ALERT"
    );
}

/// Log error with structured context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}

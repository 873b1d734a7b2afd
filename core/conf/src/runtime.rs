//! Process runtime, logging and telemetry configuration.
use serde::Deserialize;
use serde::Serialize;

/// Default time, in seconds, running operations are allowed to complete during shutdown.
pub const DEFAULT_SHUTDOWN_GRACE_TIMEOUT: u64 = 30;

/// Container for the complete process runtime configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConf {
    /// Allowed time, in seconds, for running operations to complete once process shutdown begins.
    #[serde(default = "RuntimeConf::default_shutdown_grace")]
    pub shutdown_grace_sec: u64,

    /// Number of tokio worker threads, defaults to the number of CPUs.
    #[serde(default)]
    pub worker_threads: Option<usize>,
}

impl RuntimeConf {
    fn default_shutdown_grace() -> u64 {
        DEFAULT_SHUTDOWN_GRACE_TIMEOUT
    }
}

impl Default for RuntimeConf {
    fn default() -> Self {
        RuntimeConf {
            shutdown_grace_sec: Self::default_shutdown_grace(),
            worker_threads: None,
        }
    }
}

/// Minimum level of log records to emit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Critical,
    Error,
    Warning,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Process logging configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConf {
    /// Emit log records from a background thread.
    #[serde(default, rename = "async")]
    pub async_drain: bool,

    #[serde(default)]
    pub level: LogLevel,
}

/// Telemetry configuration for the process.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TelemetryConf {
    /// Address to expose Prometheus metrics on (plain HTTP), disabled when unset.
    #[serde(default)]
    pub metrics_bind: Option<String>,
}

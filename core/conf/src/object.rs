//! Data object storing the Auth Proxy configuration.
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use super::AuthConf;
use super::HttpConf;
use super::LoggingConf;
use super::RbacConf;
use super::RuntimeConf;
use super::TelemetryConf;
use super::UpstreamConf;

/// Longest token lifetime and secret rotation grace period accepted (ten years).
///
/// Token expiry timestamps and cache lifetimes derived from these options must not overflow.
pub const MAX_DURATION_SEC: u64 = 10 * 365 * 24 * 60 * 60;

/// Global configuration for the Auth Proxy process.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Conf {
    /// Authentication, token and default accounts configuration.
    #[serde(default)]
    pub auth: AuthConf,

    /// Protected backend requests are forwarded to.
    pub backend: UpstreamConf,

    /// HTTPS server configuration.
    pub http: HttpConf,

    /// Process logging configuration.
    #[serde(default)]
    pub logging: LoggingConf,

    /// Role requirements of protected resources.
    #[serde(default)]
    pub rbac: RbacConf,

    /// Process runtime configuration.
    #[serde(default)]
    pub runtime: RuntimeConf,

    /// State Store service configuration.
    pub store: BackendConf,

    /// Telemetry configuration for the process.
    #[serde(default)]
    pub telemetry: TelemetryConf,
}

impl Conf {
    /// Check options that can't be validated by decoding alone.
    pub fn validate(&self) -> Result<()> {
        if self.auth.secret.is_some() && self.auth.secret_file.is_some() {
            anyhow::bail!(InvalidOption::new(
                "only one of auth.secret and auth.secret_file can be set"
            ));
        }
        if self.auth.token_ttl_sec == 0 {
            anyhow::bail!(InvalidOption::new("auth.token_ttl_sec must be positive"));
        }
        if self.auth.token_ttl_sec > MAX_DURATION_SEC {
            anyhow::bail!(InvalidOption(format!(
                "auth.token_ttl_sec can't exceed {} seconds",
                MAX_DURATION_SEC
            )));
        }
        if self.auth.previous_secret_grace_sec > MAX_DURATION_SEC {
            anyhow::bail!(InvalidOption(format!(
                "auth.previous_secret_grace_sec can't exceed {} seconds",
                MAX_DURATION_SEC
            )));
        }
        if self.auth.update_retries == 0 {
            anyhow::bail!(InvalidOption::new("auth.update_retries must be positive"));
        }
        if self.auth.token_header.trim().is_empty() {
            anyhow::bail!(InvalidOption::new("auth.token_header can't be empty"));
        }
        for rule in &self.rbac.rules {
            if !rule.path.starts_with('/') {
                anyhow::bail!(InvalidOption(format!(
                    "rbac rule path '{}' must start with a '/'",
                    rule.path
                )));
            }
        }
        Ok(())
    }
}

/// Unstructured configuration for runtime selected service backends.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BackendConf {
    /// ID of the backend selected to provide the service.
    pub backend: String,

    /// Backend specific configuration options.
    #[serde(default, flatten)]
    pub options: serde_json::Value,
}

/// A configuration option has an invalid value.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct InvalidOption(pub String);

impl InvalidOption {
    fn new(message: &str) -> Self {
        InvalidOption(message.to_string())
    }
}

//! Configuration for the Consul state store backend.
use serde::Deserialize;
use serde::Serialize;

/// Consul specific configuration for the state store interface.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Conf {
    /// Base URL of the Consul HTTP API (for example `http://127.0.0.1:8500`).
    #[serde(default = "Conf::default_address")]
    pub address: String,

    /// Consul ACL token to authenticate requests with.
    #[serde(default)]
    pub token: Option<String>,

    /// Timeout, in seconds, for individual requests to Consul.
    #[serde(default = "Conf::default_timeout")]
    pub timeout_sec: u64,

    /// Timeout, in seconds, to establish new connections to Consul.
    #[serde(default = "Conf::default_timeout_connect")]
    pub timeout_connect_sec: u64,

    /// Maximum time, in seconds, a blocking watch query waits for changes.
    #[serde(default = "Conf::default_watch_wait")]
    pub watch_wait_sec: u64,
}

impl Conf {
    fn default_address() -> String {
        String::from("http://127.0.0.1:8500")
    }

    fn default_timeout() -> u64 {
        5
    }

    fn default_timeout_connect() -> u64 {
        2
    }

    fn default_watch_wait() -> u64 {
        60
    }
}

/// The Consul state store backend configuration is not valid.
#[derive(Debug, thiserror::Error)]
#[error("the Consul state store backend configuration is not valid")]
pub struct ConfError;

//! Configuration for the etcd state store backend.
use serde::Deserialize;
use serde::Serialize;

/// etcd specific configuration for the state store interface.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Conf {
    /// Base URL of the etcd v3 JSON gateway (for example `http://127.0.0.1:2379`).
    #[serde(default = "Conf::default_address")]
    pub address: String,

    /// Timeout, in seconds, for individual requests to etcd.
    #[serde(default = "Conf::default_timeout")]
    pub timeout_sec: u64,

    /// Timeout, in seconds, to establish new connections to etcd.
    #[serde(default = "Conf::default_timeout_connect")]
    pub timeout_connect_sec: u64,
}

impl Conf {
    fn default_address() -> String {
        String::from("http://127.0.0.1:2379")
    }

    fn default_timeout() -> u64 {
        5
    }

    fn default_timeout_connect() -> u64 {
        2
    }
}

/// The etcd state store backend configuration is not valid.
#[derive(Debug, thiserror::Error)]
#[error("the etcd state store backend configuration is not valid")]
pub struct ConfError;

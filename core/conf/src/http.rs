//! Configuration of the HTTPS listener and the protected backend.
use serde::Deserialize;
use serde::Serialize;

/// HTTPS server configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConf {
    /// Address to bind the server to.
    #[serde(default = "HttpConf::default_bind")]
    pub bind: String,

    /// Request timeout, in milliseconds, for clients to send request headers.
    #[serde(default = "HttpConf::default_client_request_timeout")]
    pub client_request_timeout_ms: u64,

    /// Maximum number of concurrent connections for each worker.
    #[serde(default = "HttpConf::default_max_connections")]
    pub max_connections: usize,

    /// Maximum number of TLS handshakes in progress for each worker.
    #[serde(default = "HttpConf::default_max_connection_rate")]
    pub max_connection_rate: usize,

    /// Maximum size, in bytes, of request bodies decoded by the proxy.
    #[serde(default = "HttpConf::default_payload_limit")]
    pub payload_limit: usize,

    /// Path to the PEM encoded certificate chain presented to clients.
    pub tls_cert: String,

    /// Timeout, in milliseconds, for clients to complete the TLS handshake.
    #[serde(default = "HttpConf::default_tls_handshake_timeout")]
    pub tls_handshake_timeout_ms: u64,

    /// Path to the PEM encoded private key for the certificate.
    pub tls_key: String,

    /// Number of HTTP worker threads, defaults to the number of CPUs.
    #[serde(default)]
    pub workers: Option<usize>,
}

impl HttpConf {
    fn default_bind() -> String {
        String::from("0.0.0.0:10000")
    }

    fn default_client_request_timeout() -> u64 {
        5000
    }

    fn default_max_connections() -> usize {
        1024
    }

    fn default_max_connection_rate() -> usize {
        256
    }

    fn default_payload_limit() -> usize {
        8 * 1024 * 1024
    }

    fn default_tls_handshake_timeout() -> u64 {
        3000
    }
}

/// Protected backend requests are forwarded to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamConf {
    /// Base URL of the backend (for example `https://backend.local:9999`).
    pub address: String,

    /// PEM bundle of additional CA certificates to trust for HTTPS backends.
    #[serde(default)]
    pub ca_bundle: Option<String>,

    /// Skip verification of the backend certificate (testing only).
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Names of backend response headers relayed to clients.
    #[serde(default = "UpstreamConf::default_relay_headers")]
    pub relay_headers: Vec<String>,

    /// Timeout, in seconds, for the backend to respond to a forwarded request.
    #[serde(default = "UpstreamConf::default_timeout")]
    pub timeout_sec: u64,

    /// Timeout, in seconds, to connect to the backend.
    #[serde(default = "UpstreamConf::default_timeout_connect")]
    pub timeout_connect_sec: u64,
}

impl UpstreamConf {
    fn default_relay_headers() -> Vec<String> {
        [
            "cache-control",
            "content-encoding",
            "content-language",
            "content-type",
            "etag",
            "expires",
            "last-modified",
            "location",
            "vary",
        ]
        .into_iter()
        .map(String::from)
        .collect()
    }

    fn default_timeout() -> u64 {
        30
    }

    fn default_timeout_connect() -> u64 {
        5
    }
}

//! Configure and start the TLS ActixWeb Server for the proxy pipeline.
use std::net::SocketAddr;
use std::time::Duration;

use actix_web::HttpServer;
use anyhow::Result;

use authproxy_conf::HttpConf;
use authproxy_injector::Injector;

use crate::api::Forwarder;

/// Builder pattern to configure and start the proxy ActixWeb Server.
pub struct ActixServer {
    conf: HttpConf,
    forwarder: Forwarder,
    injector: Injector,
    shutdown_timeout: u64,
}

/// A server bound to its listening addresses.
pub struct BoundServer {
    pub addrs: Vec<SocketAddr>,
    pub server: actix_web::dev::Server,
}

impl ActixServer {
    /// Create an ActixWeb Server configuration builder from the process dependencies.
    pub fn new(injector: Injector) -> Result<Self> {
        let forwarder = Forwarder::new(&injector.conf.backend, &injector.conf.auth.token_header)?;
        Ok(ActixServer {
            conf: injector.conf.http.clone(),
            forwarder,
            injector: injector.clone(),
            shutdown_timeout: injector.conf.runtime.shutdown_grace_sec,
        })
    }

    /// Bind the server to the configured address, accepting TLS connections only.
    pub fn run(self, tls: rustls::ServerConfig) -> Result<BoundServer> {
        let injector = self.injector;
        let forwarder = self.forwarder;
        let mut server = HttpServer::new(move || crate::api::app(&injector, &forwarder))
            .disable_signals()
            .max_connections(self.conf.max_connections)
            .max_connection_rate(self.conf.max_connection_rate)
            .tls_handshake_timeout(Duration::from_millis(self.conf.tls_handshake_timeout_ms))
            .client_request_timeout(Duration::from_millis(self.conf.client_request_timeout_ms))
            .shutdown_timeout(self.shutdown_timeout);
        if let Some(workers) = self.conf.workers {
            server = server.workers(workers);
        }
        let server = server.bind_rustls_0_23(&self.conf.bind, tls)?;
        let addrs = server.addrs();
        let server = server.run();
        Ok(BoundServer { addrs, server })
    }
}

//! Run the Auth Proxy server.
use anyhow::Result;

use authproxy_conf::Conf;

use super::Cli;
use crate::init::Server;

/// Run the Auth Proxy server until the process is asked to stop.
pub async fn run(_cli: Cli, conf: Conf) -> Result<()> {
    Server::configure(conf)
        .await?
        .register_default_backends()
        .run()
        .await
}

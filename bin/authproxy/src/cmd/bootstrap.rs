//! Create default Auth Proxy accounts.
use anyhow::Result;

use authproxy_conf::Conf;

use super::Cli;
use crate::init::Bootstrap;

/// Create the configured default user accounts, if missing, and exit.
pub async fn run(_cli: Cli, conf: Conf) -> Result<()> {
    Bootstrap::configure(conf)
        .await?
        .register_default_backends()
        .run()
        .await
}

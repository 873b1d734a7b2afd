//! Auth Proxy bootstrap: create the default accounts and exit.
use anyhow::Result;

use authproxy_conf::Conf;
use authproxy_context::Context;

use super::generic::GenericInit;

/// Process builder to create the default user accounts.
pub struct Bootstrap {
    generic: GenericInit,
}

impl Bootstrap {
    /// Build a bootstrap process from the loaded configuration.
    pub async fn configure(conf: Conf) -> Result<Self> {
        let generic = GenericInit::configure(conf).await?;
        let bootstrap = Self { generic };
        Ok(bootstrap)
    }

    /// Register all supported backends for all process dependencies.
    pub fn register_default_backends(mut self) -> Self {
        self.generic.register_default_backends();
        self
    }

    /// Create any missing default account.
    pub async fn run(self) -> Result<()> {
        let context = Context::root(self.generic.logger.clone()).build();
        self.generic.validate_backends_conf(&context)?;
        let injector = self.generic.injector(&context).await?;
        self.generic.bootstrap_users(&injector).await?;
        Ok(())
    }
}

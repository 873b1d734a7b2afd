//! Process initialisation builder for aspects to initialise for all commands.
use std::time::Duration;

use anyhow::Result;

use authproxy_conf::Conf;
use authproxy_context::Context;
use authproxy_injector::Injector;
use authproxy_store::StoreFactoryArgs;

use super::backends::Backends;
use super::shutdown::ShutdownManager;

/// Process builder to initialise all authproxy commands.
pub struct GenericInit {
    pub backends: Backends,
    pub conf: Conf,
    pub logger: slog::Logger,
    pub metrics: prometheus::Registry,
    pub shutdown: ShutdownManager,
}

impl GenericInit {
    /// Initialise the process logger and the components shared by all commands.
    pub async fn configure(conf: Conf) -> Result<Self> {
        let logger = super::logging::configure(&conf.logging);
        let metrics = prometheus::Registry::new();
        let grace = Duration::from_secs(conf.runtime.shutdown_grace_sec);
        let shutdown = ShutdownManager::new(logger.clone(), grace);
        slog::info!(
            logger, "Process logging initialised";
            "level" => ?conf.logging.level,
        );
        let generic = Self {
            backends: Default::default(),
            conf,
            logger,
            metrics,
            shutdown,
        };
        Ok(generic)
    }

    /// Register all supported backends for all process dependencies.
    ///
    /// Supported dependencies can be tuned at compile time using crate features.
    pub fn register_default_backends(&mut self) -> &mut Self {
        #[cfg(feature = "authproxy-store-consul")]
        self.backends.register_store(
            authproxy_store_consul::BACKEND_ID,
            authproxy_store_consul::ConsulFactory,
        );
        #[cfg(feature = "authproxy-store-etcd")]
        self.backends.register_store(
            authproxy_store_etcd::BACKEND_ID,
            authproxy_store_etcd::EtcdFactory,
        );
        self
    }

    /// Register metrics for the proxy and the selected backends.
    pub fn register_metrics(&self) -> Result<&Self> {
        self.backends
            .store(&self.conf.store.backend)?
            .register_metrics(&self.metrics)?;
        crate::api::metrics::register_metrics(&self.metrics)?;
        Ok(self)
    }

    /// Validate the loaded configuration objects for the selected backends.
    pub fn validate_backends_conf(&self, context: &Context) -> Result<&Self> {
        self.backends
            .store(&self.conf.store.backend)?
            .conf_check(context, &self.conf.store.options)?;
        Ok(self)
    }

    /// Initialise the state store and the components that depend on it.
    pub async fn injector(&self, context: &Context) -> Result<Injector> {
        let store = self
            .backends
            .store(&self.conf.store.backend)?
            .store(StoreFactoryArgs {
                conf: &self.conf.store.options,
                context,
            })
            .await?;
        let secrets = super::secrets::load(&context.logger, &self.conf.auth)?;
        Injector::build(self.conf.clone(), context.clone(), store, secrets)
    }

    /// Create the default user accounts, if they don't exist.
    pub async fn bootstrap_users(&self, injector: &Injector) -> Result<usize> {
        let users = &injector.conf.auth.default_users;
        let created = injector
            .registry
            .add_default_users(&injector.context, users)
            .await?;
        slog::info!(
            injector.context.logger, "Default users bootstrapped";
            "configured" => users.len(),
            "created" => created,
        );
        Ok(created)
    }

    /// Initialisation done, wait until the process fails or the user shuts it down.
    pub async fn wait(self) -> Result<()> {
        slog::info!(self.logger, "Auth Proxy process initialisation complete");
        self.shutdown.wait().await
    }
}

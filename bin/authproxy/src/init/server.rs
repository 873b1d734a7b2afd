//! Auth Proxy server initialisation as a builder.
use std::time::Duration;

use anyhow::Result;

use authproxy_auth::identity::TokenService;
use authproxy_context::Context;
use authproxy_conf::Conf;
use authproxy_store::StoreFactory;

use super::actix::ActixServer;
use super::generic::GenericInit;

/// Process builder to initialise and run an Auth Proxy instance.
pub struct Server {
    /// Root context for the process.
    context: Context,

    /// Process initialisation logic common to all authproxy commands.
    generic: GenericInit,
}

impl Server {
    /// Build a server from the loaded configuration.
    pub async fn configure(conf: Conf) -> Result<Self> {
        let generic = GenericInit::configure(conf).await?;
        let context = Context::root(generic.logger.clone()).build();
        let server = Self { context, generic };
        Ok(server)
    }

    /// Register a new factory for a state store implementation.
    ///
    /// # Panics
    ///
    /// This method panics if the identifier of the new state store backend is already in use.
    pub fn register_store<B, S>(mut self, id: S, backend: B) -> Self
    where
        B: StoreFactory + 'static,
        S: Into<String>,
    {
        self.generic.backends.register_store(id, backend);
        self
    }

    /// Register all supported backends for all process dependencies.
    ///
    /// Supported dependencies can be tuned at compile time using crate features.
    pub fn register_default_backends(mut self) -> Self {
        self.generic.register_default_backends();
        self
    }

    /// Finalise process initialisation and run the Auth Proxy server.
    pub async fn run(mut self) -> Result<()> {
        // Prepare for late process initialisation.
        let context = self.context;
        self.generic
            .validate_backends_conf(&context)?
            .register_metrics()?;
        let tls = super::tls::server_config(&self.generic.conf.http)?;

        // Initialise dependencies and make sure the default accounts exist.
        let injector = self.generic.injector(&context).await?;
        self.generic.bootstrap_users(&injector).await?;

        // Start execution of all process components.
        slog::debug!(context.logger, "Starting proxy server");
        let api = ActixServer::new(injector.clone())?.run(tls)?;
        slog::info!(
            context.logger, "Proxy server listening for TLS connections";
            "addresses" => ?api.addrs,
        );
        self.generic.shutdown.watch_actix("proxy", api.server);

        if let Some(bind) = &self.generic.conf.telemetry.metrics_bind {
            let metrics = super::telemetry::server(bind, self.generic.metrics.clone())?;
            self.generic.shutdown.watch_actix("metrics", metrics);
            slog::info!(context.logger, "Metrics server listening"; "address" => bind);
        }

        let interval = self.generic.conf.auth.revocation_sweep_interval_sec;
        if interval > 0 {
            let sweep = sweep_revocations(context.clone(), injector.tokens.clone(), interval);
            self.generic.shutdown.watch_task(tokio::spawn(sweep));
        }

        // Run until user-requested exit or process error.
        self.generic.wait().await
    }
}

/// Periodically delete revocation entries for expired tokens.
///
/// Failures are logged and retried at the next interval.
async fn sweep_revocations(context: Context, tokens: TokenService, interval: u64) {
    let mut ticker = tokio::time::interval(Duration::from_secs(interval));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(error) = tokens.sweep_revocations(&context).await {
            slog::warn!(
                context.logger, "Revocation sweep failed";
                "error" => format!("{:#}", error),
            );
        }
    }
}

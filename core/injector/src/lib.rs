//! Dependency injection to hand process wide resources to other components.
//!
//! The [`Injector`] is built once during process initialisation and passed explicitly
//! to the components that need it, such as the HTTP server.
//! There is no process global instance: tests create as many isolated injectors as they need.
use anyhow::Result;

use authproxy_auth::access::Enforcer;
use authproxy_auth::identity::TokenOptions;
use authproxy_auth::identity::TokenSecrets;
use authproxy_auth::identity::TokenService;
use authproxy_auth::registry::AuthRegistry;
use authproxy_conf::Conf;
use authproxy_context::Context;
use authproxy_store::Store;

/// Container for all process wide dependencies to be injected in other components.
#[derive(Clone)]
pub struct Injector {
    /// Process configuration.
    pub conf: Conf,

    /// Root context for operations not tied to a request.
    pub context: Context,

    /// Role requirements of resources.
    pub enforcer: Enforcer,

    /// User accounts and credentials.
    pub registry: AuthRegistry,

    /// Access to the state store.
    pub store: Store,

    /// Bearer tokens lifecycle.
    pub tokens: TokenService,
}

impl Injector {
    /// Build all components from the process configuration and initialised store.
    pub fn build(
        conf: Conf,
        context: Context,
        store: Store,
        secrets: TokenSecrets,
    ) -> Result<Injector> {
        let enforcer = Enforcer::from_conf(&conf.rbac)?;
        let registry = AuthRegistry::new(store.clone(), &conf.auth)?;
        let tokens = TokenService::new(
            store.clone(),
            registry.clone(),
            secrets,
            TokenOptions::from(&conf.auth),
        );
        slog::trace!(context.logger, "Initialised dependency injector");
        Ok(Injector {
            conf,
            context,
            enforcer,
            registry,
            store,
            tokens,
        })
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Injector {
    /// [`Injector`] instance to be used with unit tests.
    ///
    /// The returned instance uses an in-memory store with no users in it.
    pub fn fixture() -> Injector {
        Injector::fixture_with_store(Store::fixture())
    }

    /// [`Injector`] instance for unit tests that need control over the store.
    pub fn fixture_with_store(store: Store) -> Injector {
        let conf = fixture_conf();
        let context = Context::fixture();
        let secrets = TokenSecrets::new("injector-fixture-secret");
        Injector::build(conf, context, store, secrets).expect("fixture injector must build")
    }
}

#[cfg(any(test, feature = "test-fixture"))]
fn fixture_conf() -> Conf {
    Conf {
        auth: Default::default(),
        backend: authproxy_conf::UpstreamConf {
            address: String::from("http://127.0.0.1:9"),
            ca_bundle: None,
            insecure_skip_verify: false,
            relay_headers: vec![String::from("content-type")],
            timeout_sec: 5,
            timeout_connect_sec: 1,
        },
        http: authproxy_conf::HttpConf {
            bind: String::from("127.0.0.1:0"),
            client_request_timeout_ms: 5000,
            max_connections: 16,
            max_connection_rate: 16,
            payload_limit: 1024 * 1024,
            tls_cert: String::from("cert.pem"),
            tls_handshake_timeout_ms: 3000,
            tls_key: String::from("key.pem"),
            workers: Some(1),
        },
        logging: Default::default(),
        rbac: Default::default(),
        runtime: Default::default(),
        store: authproxy_conf::BackendConf {
            backend: String::from("fixture"),
            options: serde_json::json!({}),
        },
        telemetry: Default::default(),
    }
}

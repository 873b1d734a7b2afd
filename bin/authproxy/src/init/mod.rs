//! Initialisation logic for Auth Proxy processes.
mod actix;
mod backends;
mod bootstrap;
mod generic;
pub mod logging;
mod secrets;
mod server;
mod shutdown;
mod telemetry;
mod tls;

pub use self::actix::ActixServer;
pub use self::actix::BoundServer;
pub use self::backends::BackendNotFound;
pub use self::backends::Backends;
pub use self::bootstrap::Bootstrap;
pub use self::generic::GenericInit;
pub use self::secrets::load as load_secrets;
pub use self::server::Server;
pub use self::tls::server_config as tls_config;

//! Auth Proxy configuration object and helpers.
mod auth;
mod http;
mod loading;
mod object;
mod runtime;


pub use self::auth::AuthConf;
pub use self::auth::DefaultUser;
pub use self::auth::RbacConf;
pub use self::auth::RuleConf;
pub use self::http::HttpConf;
pub use self::http::UpstreamConf;
pub use self::loading::load;
pub use self::loading::Error;
pub use self::object::BackendConf;
pub use self::object::Conf;
pub use self::runtime::LogLevel;
pub use self::runtime::LoggingConf;
pub use self::runtime::RuntimeConf;
pub use self::runtime::TelemetryConf;

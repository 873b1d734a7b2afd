//! State store backed by an etcd v3 cluster.
//!
//! The backend talks to etcd through its JSON gateway (`/v3/...` endpoints),
//! which every etcd v3 server exposes alongside the gRPC API.
//!
//! ## Versions
//!
//! Record versions are the `mod_revision` of keys, the cluster wide revision
//! at which the key was last modified.
//! Conditional changes are executed as transactions guarded on `mod_revision`
//! (or on `create_revision == 0` for keys expected to be absent).
mod client;
mod conf;
mod factory;
mod protocol;
mod watch;

pub use self::client::EtcdStore;
pub use self::conf::Conf;
pub use self::conf::ConfError;
pub use self::factory::EtcdFactory;

/// Identifier of the etcd backend in configuration and metrics.
pub const BACKEND_ID: &str = "etcd";

//! State store backed by the Consul KV store.
//!
//! ## Versions
//!
//! Record versions are the `ModifyIndex` of keys.
//! Conditional changes use the `cas` and `delete-cas` verbs of the transaction API,
//! with index `0` for keys expected to be absent.
//!
//! ## Keys
//!
//! Consul keys can't start with a `/`: leading slashes are removed before requests
//! and restored on keys returned to callers.
//!
//! ## Watches
//!
//! Watches are implemented with blocking queries over the watched prefix and report
//! the difference between consecutive snapshots.
//! Consul does not retain deleted keys so a watch resumed with a version reports
//! keys changed since that version but not keys deleted while no watch was running.
mod client;
mod conf;
mod factory;
mod protocol;
mod watch;

pub use self::client::ConsulStore;
pub use self::conf::Conf;
pub use self::conf::ConfError;
pub use self::factory::ConsulFactory;

/// Identifier of the Consul backend in configuration and metrics.
pub const BACKEND_ID: &str = "consul";

//! Strongly consistent key/value state store interface for the Auth Proxy.
//!
//! All durable state (user accounts and revoked tokens) is kept in an external store
//! selected once at process start.
//! The [`Store`] type wraps the selected [`StoreBackend`] and offers:
//!
//! - Versioned reads ([`Store::get`]) and ordered prefix listing ([`Store::list`]).
//! - Conditional writes and deletes guarded by an [`ExpectedVersion`].
//!   A stale expectation always fails with [`VersionConflict`](errors::VersionConflict):
//!   of two racing conditional writes to the same key exactly one succeeds.
//! - Change notification ([`Store::watch`]) as a lazy, infinite and restartable stream.
//!
//! ## Failure reporting
//!
//! Backends never retry internally.
//! Connectivity problems are reported with an [`Unavailable`](errors::Unavailable) error
//! and the retry policy is left to callers.
use std::sync::Arc;

use anyhow::Context as AnyContext;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as Json;

use authproxy_context::Context;

pub mod errors;
pub mod telemetry;

mod record;

#[cfg(any(test, feature = "test-fixture"))]
mod fixture;
#[cfg(any(test, feature = "test-fixture"))]
pub use self::fixture::StoreFixture;


pub use self::record::ExpectedVersion;
pub use self::record::StateRecord;
pub use self::record::Version;
pub use self::record::WatchEvent;
pub use self::record::WatchEventKind;
pub use self::record::WatchStream;

/// Query, conditionally mutate and watch durable state.
#[derive(Clone)]
pub struct Store {
    /// Implementation of the state store selected at process start.
    inner: Arc<dyn StoreBackend>,
}

impl Store {
    /// Delete a key if its current version matches the expectation.
    pub async fn delete(
        &self,
        context: &Context,
        key: &str,
        expected: ExpectedVersion,
    ) -> Result<()> {
        self.inner.delete(context, key, expected).await
    }

    /// Read the current value and version of a key.
    ///
    /// Fails with [`NotFound`](errors::NotFound) if the key does not exist.
    pub async fn get(&self, context: &Context, key: &str) -> Result<StateRecord> {
        self.inner.get(context, key).await
    }

    /// Read and decode a JSON value stored at a key.
    pub async fn get_json<T>(&self, context: &Context, key: &str) -> Result<(T, Version)>
    where
        T: DeserializeOwned,
    {
        let record = self.get(context, key).await?;
        let value = record.decode()?;
        Ok((value, record.version))
    }

    /// List all records with keys starting with `prefix`, sorted by key.
    pub async fn list(&self, context: &Context, prefix: &str) -> Result<Vec<StateRecord>> {
        let mut records = self.inner.list(context, prefix).await?;
        records.sort_by(|left, right| left.key.cmp(&right.key));
        Ok(records)
    }

    /// Write a value to a key if its current version matches the expectation.
    ///
    /// Returns the new version of the key on success.
    pub async fn put(
        &self,
        context: &Context,
        key: &str,
        value: Vec<u8>,
        expected: ExpectedVersion,
    ) -> Result<Version> {
        self.inner.put(context, key, value, expected).await
    }

    /// Encode a value as JSON and [`put`](Store::put) it.
    pub async fn put_json<T>(
        &self,
        context: &Context,
        key: &str,
        value: &T,
        expected: ExpectedVersion,
    ) -> Result<Version>
    where
        T: Serialize,
    {
        let value = serde_json::to_vec(value)
            .with_context(|| self::errors::EncodeRecord::new(key))?;
        self.put(context, key, value, expected).await
    }

    /// Watch for changes to keys starting with `prefix`.
    ///
    /// When `since` is set only changes after that version are returned, which allows
    /// callers to resume a watch after an interruption.
    pub async fn watch(
        &self,
        context: &Context,
        prefix: &str,
        since: Option<Version>,
    ) -> Result<WatchStream> {
        self.inner.watch(context, prefix, since).await
    }
}

impl<T> From<T> for Store
where
    T: StoreBackend + 'static,
{
    fn from(value: T) -> Self {
        Store {
            inner: Arc::new(value),
        }
    }
}

#[cfg(any(test, feature = "test-fixture"))]
impl Store {
    /// Initialise a new in-memory store backend fixture for unit tests.
    pub fn fixture() -> Self {
        let inner = StoreFixture::default();
        Self::from(inner)
    }
}

/// Operations implemented by state stores supported by the Auth Proxy.
///
/// All implementations must provide linearizable conditional writes
/// and report connectivity problems as [`Unavailable`](errors::Unavailable) errors.
#[async_trait::async_trait]
pub trait StoreBackend: Send + Sync {
    /// Delete a key if its current version matches the expectation.
    async fn delete(&self, context: &Context, key: &str, expected: ExpectedVersion) -> Result<()>;

    /// Read the current value and version of a key.
    async fn get(&self, context: &Context, key: &str) -> Result<StateRecord>;

    /// List all records with keys starting with `prefix`, in any order.
    async fn list(&self, context: &Context, prefix: &str) -> Result<Vec<StateRecord>>;

    /// Write a value to a key if its current version matches the expectation.
    async fn put(
        &self,
        context: &Context,
        key: &str,
        value: Vec<u8>,
        expected: ExpectedVersion,
    ) -> Result<Version>;

    /// Watch for changes to keys starting with `prefix`.
    async fn watch(
        &self,
        context: &Context,
        prefix: &str,
        since: Option<Version>,
    ) -> Result<WatchStream>;
}

/// Initialisation logic for the state store and the client to access it.
#[async_trait::async_trait]
pub trait StoreFactory: Send + Sync {
    /// Validate the user provided configuration for the backend.
    fn conf_check(&self, context: &Context, conf: &Json) -> Result<()>;

    /// Register backend specific metrics.
    fn register_metrics(&self, registry: &prometheus::Registry) -> Result<()>;

    /// Instantiate a [`Store`] object to access durable state.
    async fn store<'a>(&self, args: StoreFactoryArgs<'a>) -> Result<Store>;
}

/// Arguments passed to the [`StoreFactory`] client initialisation method.
pub struct StoreFactoryArgs<'a> {
    /// The configuration block for the backend to initialise.
    pub conf: &'a Json,

    /// Container for operation scoped values.
    pub context: &'a Context,
}

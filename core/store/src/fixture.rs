//! In-memory implementation of [`Store`](super::Store) for unit tests.
//!
//! The fixture follows the same conditional write and watch semantics as the real backends:
//! a single revision counter is incremented on every change and assigned as the new version.
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use anyhow::Result;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use authproxy_context::Context;

use super::errors::NotFound;
use super::errors::Unavailable;
use super::errors::VersionConflict;
use super::ExpectedVersion;
use super::StateRecord;
use super::StoreBackend;
use super::Version;
use super::WatchEvent;
use super::WatchEventKind;
use super::WatchStream;

/// Number of change events buffered for slow watchers.
const WATCH_BUFFER: usize = 1024;

/// In-memory implementation of a mock [`Store`](super::Store) for unit tests.
#[derive(Clone)]
pub struct StoreFixture {
    /// Shared in-memory state to mock the store with.
    inner: Arc<Mutex<StoreFixtureState>>,

    /// Notify watchers of changes.
    events: broadcast::Sender<WatchEvent>,
}

impl StoreFixture {
    /// Simulate the store becoming unreachable (or reachable again).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.access().unavailable = unavailable;
    }

    /// Lock and access the shared inner store.
    fn access(&self) -> MutexGuard<StoreFixtureState> {
        self.inner
            .lock()
            .expect("StoreFixture::inner state lock poisoned")
    }

    /// Lock the shared state, failing if the store is marked unavailable.
    fn access_available(&self) -> Result<MutexGuard<StoreFixtureState>> {
        let state = self.access();
        if state.unavailable {
            anyhow::bail!(Unavailable);
        }
        Ok(state)
    }
}

impl Default for StoreFixture {
    fn default() -> Self {
        let inner = StoreFixtureState::default();
        let inner = Arc::new(Mutex::new(inner));
        let (events, _) = broadcast::channel(WATCH_BUFFER);
        StoreFixture { inner, events }
    }
}

#[async_trait::async_trait]
impl StoreBackend for StoreFixture {
    async fn delete(&self, _: &Context, key: &str, expected: ExpectedVersion) -> Result<()> {
        let mut store = self.access_available()?;
        let current = store.records.get(key).map(|(_, version)| *version);
        match (expected, current) {
            (_, None) => anyhow::bail!(NotFound::new(key)),
            (ExpectedVersion::Absent, Some(_)) => anyhow::bail!(VersionConflict::new(key)),
            (ExpectedVersion::Exact(expected), Some(current)) if expected != current => {
                anyhow::bail!(VersionConflict::new(key))
            }
            _ => (),
        };

        store.records.remove(key);
        let version = store.next_version();
        let event = WatchEvent {
            kind: WatchEventKind::Delete,
            key: key.to_string(),
            value: Vec::new(),
            version,
        };
        store.history.push(event.clone());
        let _ = self.events.send(event);
        Ok(())
    }

    async fn get(&self, _: &Context, key: &str) -> Result<StateRecord> {
        let store = self.access_available()?;
        let (value, version) = store
            .records
            .get(key)
            .ok_or_else(|| NotFound::new(key))?;
        Ok(StateRecord {
            key: key.to_string(),
            value: value.clone(),
            version: *version,
        })
    }

    async fn list(&self, _: &Context, prefix: &str) -> Result<Vec<StateRecord>> {
        let store = self.access_available()?;
        let records = store
            .records
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, (value, version))| StateRecord {
                key: key.clone(),
                value: value.clone(),
                version: *version,
            })
            .collect();
        Ok(records)
    }

    async fn put(
        &self,
        _: &Context,
        key: &str,
        value: Vec<u8>,
        expected: ExpectedVersion,
    ) -> Result<Version> {
        let mut store = self.access_available()?;
        let current = store.records.get(key).map(|(_, version)| *version);
        let allowed = match expected {
            ExpectedVersion::Any => true,
            ExpectedVersion::Absent => current.is_none(),
            ExpectedVersion::Exact(expected) => current == Some(expected),
        };
        if !allowed {
            anyhow::bail!(VersionConflict::new(key));
        }

        let version = store.next_version();
        store
            .records
            .insert(key.to_string(), (value.clone(), version));
        let event = WatchEvent {
            kind: WatchEventKind::Put,
            key: key.to_string(),
            value,
            version,
        };
        store.history.push(event.clone());
        let _ = self.events.send(event);
        Ok(version)
    }

    async fn watch(
        &self,
        _: &Context,
        prefix: &str,
        since: Option<Version>,
    ) -> Result<WatchStream> {
        // Subscribe while holding the lock so no change is missed between backlog and live events.
        let store = self.access_available()?;
        let receiver = self.events.subscribe();
        let backlog: Vec<WatchEvent> = match since {
            None => Vec::new(),
            Some(since) => store
                .history
                .iter()
                .filter(|event| event.key.starts_with(prefix) && event.version > since)
                .cloned()
                .collect(),
        };
        drop(store);

        let last = backlog.last().map(|event| event.version).or(since);
        let prefix = prefix.to_string();
        let live = futures::stream::unfold(
            (receiver, prefix, last),
            |(mut receiver, prefix, last)| async move {
                loop {
                    match receiver.recv().await {
                        Ok(event) => {
                            let seen = last.map(|last| event.version <= last).unwrap_or(false);
                            if seen || !event.key.starts_with(&prefix) {
                                continue;
                            }
                            return Some((Ok(event), (receiver, prefix, last)));
                        }
                        Err(RecvError::Lagged(_)) => {
                            let error = anyhow::anyhow!(Unavailable).context("watcher fell behind");
                            return Some((Err(error), (receiver, prefix, last)));
                        }
                        Err(RecvError::Closed) => return None,
                    }
                }
            },
        );
        let backlog = futures::stream::iter(backlog.into_iter().map(Ok));
        let stream = futures::StreamExt::chain(backlog, live);
        Ok(Box::pin(stream))
    }
}

/// Container for the shared state.
#[derive(Default)]
struct StoreFixtureState {
    history: Vec<WatchEvent>,
    records: BTreeMap<String, (Vec<u8>, Version)>,
    revision: u64,
    unavailable: bool,
}

impl StoreFixtureState {
    fn next_version(&mut self) -> Version {
        self.revision += 1;
        Version::from(self.revision)
    }
}

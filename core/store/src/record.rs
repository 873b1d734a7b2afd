//! Versioned records, write expectations and change events.
use std::fmt;
use std::pin::Pin;

use anyhow::Context;
use anyhow::Result;
use futures::Stream;
use serde::de::DeserializeOwned;

use crate::errors::DecodeRecord;

/// Opaque version of a key, as assigned by the store on every write.
///
/// Versions of a key only increase over time.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Version(u64);

impl Version {
    /// Backend specific numeric representation of the version.
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Version(value)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Condition a write or delete must satisfy to be applied.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ExpectedVersion {
    /// Apply the change regardless of the current state of the key.
    Any,

    /// Apply the change only if the key does not exist.
    Absent,

    /// Apply the change only if the key exists with exactly this version.
    Exact(Version),
}

impl From<Version> for ExpectedVersion {
    fn from(value: Version) -> Self {
        ExpectedVersion::Exact(value)
    }
}

/// A key, its value and the version of the value.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StateRecord {
    pub key: String,
    pub value: Vec<u8>,
    pub version: Version,
}

impl StateRecord {
    /// Decode the record value from JSON.
    pub fn decode<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        serde_json::from_slice(&self.value).with_context(|| DecodeRecord::new(&self.key))
    }
}

/// Kind of change observed by a watch.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WatchEventKind {
    Put,
    Delete,
}

/// A change to a watched key.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub key: String,

    /// New value of the key, empty for deletes.
    pub value: Vec<u8>,

    /// Store version at which the change happened, usable to resume a watch.
    pub version: Version,
}

/// Alias for a heap-allocated [`Stream`] of [`WatchEvent`]s.
pub type WatchStream = Pin<Box<dyn Stream<Item = Result<WatchEvent>> + Send>>;

//! Errors reported by state store operations.
//!
//! Errors are attached to [`anyhow::Error`]s so callers can classify failures with
//! [`anyhow::Error::is`] regardless of the backend in use.

/// A conditional write or delete did not match the current version of the key.
#[derive(Debug, thiserror::Error)]
#[error("change to key '{key}' conflicts with its current version")]
pub struct VersionConflict {
    pub key: String,
}

impl VersionConflict {
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self { key: key.into() }
    }
}

/// The requested key does not exist in the store.
#[derive(Debug, thiserror::Error)]
#[error("key '{key}' not found in the state store")]
pub struct NotFound {
    pub key: String,
}

impl NotFound {
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self { key: key.into() }
    }
}

/// The state store could not be reached or failed to answer in time.
#[derive(Debug, thiserror::Error)]
#[error("the state store is unavailable")]
pub struct Unavailable;

/// A record stored at the given key could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("unable to decode record stored at key '{key}'")]
pub struct DecodeRecord {
    pub key: String,
}

impl DecodeRecord {
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self { key: key.into() }
    }
}

/// A record could not be encoded for storage at the given key.
#[derive(Debug, thiserror::Error)]
#[error("unable to encode record for key '{key}'")]
pub struct EncodeRecord {
    pub key: String,
}

impl EncodeRecord {
    pub fn new<S: Into<String>>(key: S) -> Self {
        Self { key: key.into() }
    }
}

/// The state store answered with a response that does not follow its protocol.
#[derive(Debug, thiserror::Error)]
#[error("the state store returned an invalid response: {0}")]
pub struct InvalidResponse(pub String);

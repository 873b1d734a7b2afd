//! Request and response payloads of the Consul KV and transaction APIs.
use std::collections::BTreeMap;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde::Serialize;

use authproxy_store::errors::InvalidResponse;
use authproxy_store::ExpectedVersion;
use authproxy_store::StateRecord;
use authproxy_store::Version;
use authproxy_store::WatchEvent;
use authproxy_store::WatchEventKind;

/// Map a state store key onto a Consul key.
pub fn consul_key(key: &str) -> &str {
    key.trim_start_matches('/')
}

/// Map a Consul key back onto a state store key.
pub fn store_key(key: &str, rooted: bool) -> String {
    if rooted {
        format!("/{}", key)
    } else {
        key.to_string()
    }
}

/// A key/value pair as returned by Consul.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KvPair {
    pub key: String,

    #[serde(default)]
    pub value: Option<String>,

    #[serde(default)]
    pub modify_index: u64,
}

impl KvPair {
    /// Convert the Consul representation into a [`StateRecord`].
    pub fn into_record(self, rooted: bool) -> Result<StateRecord> {
        let value = match self.value {
            None => Vec::new(),
            Some(value) => STANDARD
                .decode(value)
                .map_err(|error| anyhow::anyhow!(InvalidResponse(error.to_string())))?,
        };
        Ok(StateRecord {
            key: store_key(&self.key, rooted),
            value,
            version: Version::from(self.modify_index),
        })
    }
}

/// A single KV operation in a Consul transaction.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct KvOp {
    pub verb: &'static str,
    pub key: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct TxnOp {
    #[serde(rename = "KV")]
    pub kv: KvOp,
}

impl TxnOp {
    /// Write `value` to `key` if the key matches the expectation.
    pub fn put(key: &str, value: &[u8], expected: ExpectedVersion) -> TxnOp {
        let (verb, index) = match expected {
            ExpectedVersion::Any => ("set", None),
            ExpectedVersion::Absent => ("cas", Some(0)),
            ExpectedVersion::Exact(version) => ("cas", Some(version.get())),
        };
        TxnOp {
            kv: KvOp {
                verb,
                key: consul_key(key).to_string(),
                value: Some(STANDARD.encode(value)),
                index,
            },
        }
    }

    /// Fail the transaction if `key` does not exist.
    pub fn get(key: &str) -> TxnOp {
        TxnOp {
            kv: KvOp {
                verb: "get",
                key: consul_key(key).to_string(),
                value: None,
                index: None,
            },
        }
    }

    /// Delete `key`, only at the given version if one is set.
    pub fn delete(key: &str, version: Option<Version>) -> TxnOp {
        let (verb, index) = match version {
            None => ("delete", None),
            Some(version) => ("delete-cas", Some(version.get())),
        };
        TxnOp {
            kv: KvOp {
                verb,
                key: consul_key(key).to_string(),
                value: None,
                index,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TxnResult {
    #[serde(rename = "KV")]
    pub kv: Option<KvPair>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TxnError {
    #[serde(default)]
    pub op_index: usize,

    #[serde(default)]
    pub what: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TxnResponse {
    #[serde(default)]
    pub results: Option<Vec<TxnResult>>,

    #[serde(default)]
    pub errors: Option<Vec<TxnError>>,
}

impl TxnResponse {
    /// Index of the first key modified by a successful transaction.
    pub fn modify_index(&self) -> Option<u64> {
        self.results
            .iter()
            .flatten()
            .filter_map(|result| result.kv.as_ref())
            .map(|kv| kv.modify_index)
            .next()
    }

    /// Describe the reasons a transaction was rolled back.
    pub fn describe_errors(&self) -> String {
        self.errors
            .iter()
            .flatten()
            .map(|error| format!("op {}: {}", error.op_index, error.what))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Current view of the keys under a watched prefix.
pub type Snapshot = BTreeMap<String, (Vec<u8>, Version)>;

/// Build a [`Snapshot`] from the records under a prefix.
pub fn snapshot(records: Vec<StateRecord>) -> Snapshot {
    records
        .into_iter()
        .map(|record| (record.key, (record.value, record.version)))
        .collect()
}

/// Compute the events that turn the `previous` snapshot into the `current` one.
///
/// Deleted keys are reported with the `index` of the blocking query that observed them.
pub fn diff(previous: &Snapshot, current: &Snapshot, index: Version) -> Vec<WatchEvent> {
    let mut events: Vec<WatchEvent> = current
        .iter()
        .filter(|(key, (_, version))| match previous.get(*key) {
            None => true,
            Some((_, previous)) => previous != version,
        })
        .map(|(key, (value, version))| WatchEvent {
            kind: WatchEventKind::Put,
            key: key.clone(),
            value: value.clone(),
            version: *version,
        })
        .collect();
    events.extend(
        previous
            .keys()
            .filter(|key| !current.contains_key(*key))
            .map(|key| WatchEvent {
                kind: WatchEventKind::Delete,
                key: key.clone(),
                value: Vec::new(),
                version: index,
            }),
    );
    events.sort_by(|left, right| left.version.cmp(&right.version));
    events
}

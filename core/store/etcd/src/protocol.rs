//! Request and response payloads of the etcd v3 JSON gateway.
//!
//! The gateway encodes keys and values as base64 strings and 64-bit integers as
//! decimal strings. Fields with default values are omitted from responses.
use std::collections::VecDeque;

use anyhow::Result;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;

use authproxy_store::errors::InvalidResponse;
use authproxy_store::ExpectedVersion;
use authproxy_store::StateRecord;
use authproxy_store::Version;
use authproxy_store::WatchEvent;
use authproxy_store::WatchEventKind;

/// Encode a key or value for the gateway.
pub fn encode(value: &[u8]) -> String {
    STANDARD.encode(value)
}

/// Decode a key or value from the gateway.
pub fn decode(value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|error| anyhow::anyhow!(InvalidResponse(error.to_string())))
}

/// Compute the end of the key range covering all keys starting with `prefix`.
pub fn prefix_range_end(prefix: &str) -> Vec<u8> {
    let mut end = prefix.as_bytes().to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    // An empty (or all 0xff) prefix covers the whole key space.
    vec![0]
}

/// Accept 64-bit integers encoded either as JSON numbers or strings.
fn int64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(u64),
        Text(String),
    }
    match Int64::deserialize(deserializer)? {
        Int64::Number(value) => Ok(value),
        Int64::Text(value) => value.parse().map_err(serde::de::Error::custom),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseHeader {
    #[serde(default, deserialize_with = "int64")]
    pub revision: u64,
}

#[derive(Debug, Deserialize)]
pub struct KeyValue {
    pub key: String,

    #[serde(default)]
    pub value: String,

    #[serde(default, deserialize_with = "int64")]
    pub mod_revision: u64,
}

impl KeyValue {
    /// Convert the gateway representation into a [`StateRecord`].
    pub fn into_record(self) -> Result<StateRecord> {
        let key = String::from_utf8(decode(&self.key)?)
            .map_err(|error| anyhow::anyhow!(InvalidResponse(error.to_string())))?;
        let value = decode(&self.value)?;
        Ok(StateRecord {
            key,
            value,
            version: Version::from(self.mod_revision),
        })
    }
}

#[derive(Debug, Default, Serialize)]
pub struct RangeRequest {
    pub key: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub range_end: Option<String>,
}

impl RangeRequest {
    pub fn key(key: &str) -> RangeRequest {
        RangeRequest {
            key: encode(key.as_bytes()),
            range_end: None,
        }
    }

    pub fn prefix(prefix: &str) -> RangeRequest {
        RangeRequest {
            key: encode(prefix.as_bytes()),
            range_end: Some(encode(&prefix_range_end(prefix))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct RangeResponse {
    #[serde(default)]
    pub kvs: Vec<KeyValue>,
}

#[derive(Debug, Serialize)]
pub struct PutRequest {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Serialize)]
pub struct DeleteRangeRequest {
    pub key: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteRangeResponse {
    #[serde(default, deserialize_with = "int64")]
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct Compare {
    pub key: String,
    pub target: &'static str,
    pub result: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_revision: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_revision: Option<String>,
}

impl Compare {
    /// Build the transaction guard matching an [`ExpectedVersion`], if any is needed.
    pub fn expect(key: &str, expected: ExpectedVersion) -> Option<Compare> {
        let key = encode(key.as_bytes());
        match expected {
            ExpectedVersion::Any => None,
            ExpectedVersion::Absent => Some(Compare {
                key,
                target: "CREATE",
                result: "EQUAL",
                mod_revision: None,
                create_revision: Some(String::from("0")),
            }),
            ExpectedVersion::Exact(version) => Some(Compare {
                key,
                target: "MOD",
                result: "EQUAL",
                mod_revision: Some(version.get().to_string()),
                create_revision: None,
            }),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestOp {
    RequestDeleteRange(DeleteRangeRequest),
    RequestPut(PutRequest),
    RequestRange(RangeRequest),
}

#[derive(Debug, Default, Serialize)]
pub struct TxnRequest {
    pub compare: Vec<Compare>,
    pub success: Vec<RequestOp>,
    pub failure: Vec<RequestOp>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponseOp {
    #[serde(default)]
    pub response_range: Option<RangeResponse>,

    #[serde(default)]
    pub response_delete_range: Option<DeleteRangeResponse>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TxnResponse {
    #[serde(default)]
    pub header: ResponseHeader,

    #[serde(default)]
    pub succeeded: bool,

    #[serde(default)]
    pub responses: Vec<ResponseOp>,
}

impl TxnResponse {
    /// Check if the first range response in the transaction found any key.
    pub fn range_found(&self) -> bool {
        self.responses
            .iter()
            .filter_map(|response| response.response_range.as_ref())
            .any(|range| !range.kvs.is_empty())
    }

    /// Number of keys deleted by the transaction.
    pub fn deleted(&self) -> u64 {
        self.responses
            .iter()
            .filter_map(|response| response.response_delete_range.as_ref())
            .map(|delete| delete.deleted)
            .sum()
    }
}

#[derive(Debug, Serialize)]
pub struct WatchCreateRequest {
    pub key: String,
    pub range_end: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_revision: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct WatchRequest {
    pub create_request: WatchCreateRequest,
}

impl WatchRequest {
    /// Watch all keys under a prefix, optionally resuming after a version.
    pub fn prefix(prefix: &str, since: Option<Version>) -> WatchRequest {
        WatchRequest {
            create_request: WatchCreateRequest {
                key: encode(prefix.as_bytes()),
                range_end: encode(&prefix_range_end(prefix)),
                start_revision: since.map(|since| (since.get() + 1).to_string()),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Event {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    pub kv: KeyValue,
}

#[derive(Debug, Default, Deserialize)]
pub struct WatchResponse {
    #[serde(default)]
    pub canceled: bool,

    #[serde(default)]
    pub cancel_reason: Option<String>,

    #[serde(default)]
    pub events: Vec<Event>,
}

#[derive(Debug, Deserialize)]
pub struct WatchChunk {
    #[serde(default)]
    pub result: Option<WatchResponse>,

    #[serde(default)]
    pub error: Option<serde_json::Value>,
}

/// Decode complete lines of a watch response body into events.
///
/// Incomplete trailing data is left in the buffer for the next chunk.
pub fn drain_watch_lines(buffer: &mut Vec<u8>, events: &mut VecDeque<WatchEvent>) -> Result<()> {
    while let Some(end) = buffer.iter().position(|byte| *byte == b'\n') {
        let line: Vec<u8> = buffer.drain(..=end).collect();
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let chunk: WatchChunk = serde_json::from_slice(&line)
            .map_err(|error| anyhow::anyhow!(InvalidResponse(error.to_string())))?;
        if let Some(error) = chunk.error {
            anyhow::bail!(InvalidResponse(error.to_string()));
        }
        let result = match chunk.result {
            None => continue,
            Some(result) => result,
        };
        if result.canceled {
            let reason = result.cancel_reason.unwrap_or_default();
            anyhow::bail!(InvalidResponse(format!("watch cancelled: {}", reason)));
        }
        for event in result.events {
            let kind = match event.kind.as_deref() {
                Some("DELETE") => WatchEventKind::Delete,
                _ => WatchEventKind::Put,
            };
            let record = event.kv.into_record()?;
            events.push_back(WatchEvent {
                kind,
                key: record.key,
                value: record.value,
                version: record.version,
            });
        }
    }
    Ok(())
}

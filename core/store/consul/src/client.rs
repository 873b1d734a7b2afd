//! Implementation of the [`StoreBackend`] interface on the Consul HTTP API.
use std::time::Duration;

use anyhow::Context as AnyContext;
use anyhow::Result;

use authproxy_context::Context;
use authproxy_store::errors::InvalidResponse;
use authproxy_store::errors::NotFound;
use authproxy_store::errors::Unavailable;
use authproxy_store::errors::VersionConflict;
use authproxy_store::telemetry::count_error;
use authproxy_store::telemetry::observe_op;
use authproxy_store::ExpectedVersion;
use authproxy_store::StateRecord;
use authproxy_store::StoreBackend;
use authproxy_store::Version;
use authproxy_store::WatchStream;

use crate::protocol::consul_key;
use crate::protocol::KvPair;
use crate::protocol::TxnOp;
use crate::protocol::TxnResponse;
use crate::Conf;
use crate::BACKEND_ID;

/// Header carrying the Consul ACL token.
const TOKEN_HEADER: &str = "X-Consul-Token";

/// Header carrying the Consul index a response reflects.
const INDEX_HEADER: &str = "X-Consul-Index";

/// Outcome of a Consul transaction.
enum TxnOutcome {
    Applied(TxnResponse),
    RolledBack(TxnResponse),
}

/// Shared access to the Consul HTTP API.
#[derive(Clone)]
pub(crate) struct ConsulClient {
    base: String,
    client: reqwest::Client,
    token: Option<String>,
}

impl ConsulClient {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base, path);
        let request = self.client.request(method, url);
        match &self.token {
            None => request,
            Some(token) => request.header(TOKEN_HEADER, token),
        }
    }

    /// Fetch all records under a prefix with the Consul index they reflect.
    ///
    /// When `block` is set the request waits for the index to move past the given value
    /// or for the wait time to elapse.
    pub(crate) async fn fetch_prefix(
        &self,
        prefix: &str,
        block: Option<(u64, Duration)>,
    ) -> Result<(Vec<StateRecord>, u64)> {
        let path = format!("/v1/kv/{}", consul_key(prefix));
        let mut request = self
            .request(reqwest::Method::GET, &path)
            .query(&[("recurse", "true")]);
        if let Some((index, wait)) = block {
            let params = [
                ("index", index.to_string()),
                ("wait", format!("{}s", wait.as_secs())),
            ];
            request = request.query(&params).timeout(block_timeout(wait));
        }
        let response = request.send().await.context(Unavailable)?;
        let index = response
            .headers()
            .get(INDEX_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok())
            .unwrap_or_default();
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok((Vec::new(), index));
        }
        let response = check_status(response).await?;
        let pairs: Vec<KvPair> = response
            .json()
            .await
            .map_err(|error| anyhow::anyhow!(InvalidResponse(error.to_string())))?;
        let rooted = prefix.starts_with('/');
        let records = pairs
            .into_iter()
            .map(|pair| pair.into_record(rooted))
            .collect::<Result<Vec<_>>>()?;
        Ok((records, index))
    }

    async fn fetch_key(&self, key: &str) -> Result<StateRecord> {
        let path = format!("/v1/kv/{}", consul_key(key));
        let response = self
            .request(reqwest::Method::GET, &path)
            .send()
            .await
            .context(Unavailable)?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            anyhow::bail!(NotFound::new(key));
        }
        let response = check_status(response).await?;
        let pairs: Vec<KvPair> = response
            .json()
            .await
            .map_err(|error| anyhow::anyhow!(InvalidResponse(error.to_string())))?;
        let pair = pairs
            .into_iter()
            .next()
            .ok_or_else(|| NotFound::new(key))?;
        pair.into_record(key.starts_with('/'))
    }

    async fn txn(&self, ops: Vec<TxnOp>) -> Result<TxnOutcome> {
        let response = self
            .request(reqwest::Method::PUT, "/v1/txn")
            .json(&ops)
            .send()
            .await
            .context(Unavailable)?;
        let rolled_back = response.status() == reqwest::StatusCode::CONFLICT;
        let response = if rolled_back {
            response
        } else {
            check_status(response).await?
        };
        let body: TxnResponse = response
            .json()
            .await
            .map_err(|error| anyhow::anyhow!(InvalidResponse(error.to_string())))?;
        if rolled_back {
            Ok(TxnOutcome::RolledBack(body))
        } else {
            Ok(TxnOutcome::Applied(body))
        }
    }

    /// Classify a rolled back change to `key` as a missing key or a version conflict.
    async fn conflict_or_missing(&self, key: &str) -> anyhow::Error {
        match self.fetch_key(key).await {
            Ok(_) => anyhow::anyhow!(VersionConflict::new(key)),
            Err(error) => error,
        }
    }
}

/// Implementation of the [`StoreBackend`] interface using Consul.
pub struct ConsulStore {
    client: ConsulClient,

    /// Client used for blocking queries, which need a longer request timeout.
    watch_client: ConsulClient,
    watch_wait: Duration,
}

impl ConsulStore {
    /// Initialise a Consul backed [`StoreBackend`].
    pub fn new(conf: &Conf) -> Result<Self> {
        let connect_timeout = Duration::from_secs(conf.timeout_connect_sec);
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(Duration::from_secs(conf.timeout_sec))
            .build()?;
        let watch_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        let base = conf.address.trim_end_matches('/').to_string();
        Ok(ConsulStore {
            client: ConsulClient {
                base: base.clone(),
                client,
                token: conf.token.clone(),
            },
            watch_client: ConsulClient {
                base,
                client: watch_client,
                token: conf.token.clone(),
            },
            watch_wait: Duration::from_secs(conf.watch_wait_sec),
        })
    }
}

#[async_trait::async_trait]
impl StoreBackend for ConsulStore {
    async fn delete(&self, _: &Context, key: &str, expected: ExpectedVersion) -> Result<()> {
        let (err_count, _timer) = observe_op(BACKEND_ID, "delete");
        let ops = match expected {
            ExpectedVersion::Absent => None,
            ExpectedVersion::Any => Some(vec![TxnOp::get(key), TxnOp::delete(key, None)]),
            ExpectedVersion::Exact(version) => Some(vec![TxnOp::delete(key, Some(version))]),
        };
        let result = match ops {
            // Keys expected to be absent can't be deleted: report why based on their state.
            None => Err(self.client.conflict_or_missing(key).await),
            Some(ops) => match self.client.txn(ops).await {
                Ok(TxnOutcome::Applied(_)) => Ok(()),
                Ok(TxnOutcome::RolledBack(_)) => Err(self.client.conflict_or_missing(key).await),
                Err(error) => Err(error),
            },
        };
        count_error(&err_count, &result);
        result
    }

    async fn get(&self, _: &Context, key: &str) -> Result<StateRecord> {
        let (err_count, _timer) = observe_op(BACKEND_ID, "get");
        let result = self.client.fetch_key(key).await;
        count_error(&err_count, &result);
        result
    }

    async fn list(&self, _: &Context, prefix: &str) -> Result<Vec<StateRecord>> {
        let (err_count, _timer) = observe_op(BACKEND_ID, "list");
        let result = self
            .client
            .fetch_prefix(prefix, None)
            .await
            .map(|(records, _)| records);
        count_error(&err_count, &result);
        result
    }

    async fn put(
        &self,
        _: &Context,
        key: &str,
        value: Vec<u8>,
        expected: ExpectedVersion,
    ) -> Result<Version> {
        let (err_count, _timer) = observe_op(BACKEND_ID, "put");
        let ops = vec![TxnOp::put(key, &value, expected)];
        let result = match self.client.txn(ops).await {
            Ok(TxnOutcome::Applied(response)) => match response.modify_index() {
                Some(index) => Ok(Version::from(index)),
                None => Err(anyhow::anyhow!(InvalidResponse(String::from(
                    "transaction result is missing the key index"
                )))),
            },
            Ok(TxnOutcome::RolledBack(response)) => Err(anyhow::anyhow!(VersionConflict::new(key))
                .context(response.describe_errors())),
            Err(error) => Err(error),
        };
        count_error(&err_count, &result);
        result
    }

    async fn watch(
        &self,
        _: &Context,
        prefix: &str,
        since: Option<Version>,
    ) -> Result<WatchStream> {
        let stream = crate::watch::watch(
            self.watch_client.clone(),
            self.watch_wait,
            prefix.to_string(),
            since,
        );
        Ok(stream)
    }
}

/// Map HTTP error statuses onto state store errors.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let error = anyhow::anyhow!(InvalidResponse(format!("HTTP {}: {}", status, body)));
    if status.is_server_error() {
        return Err(error.context(Unavailable));
    }
    Err(error)
}

/// Request timeout for blocking queries, leaving room for the jitter Consul adds to waits.
fn block_timeout(wait: Duration) -> Duration {
    wait + wait / 16 + Duration::from_secs(5)
}

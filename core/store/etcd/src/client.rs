//! Implementation of the [`StoreBackend`] interface on the etcd v3 JSON gateway.
use std::time::Duration;

use anyhow::Context as AnyContext;
use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;

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

use crate::protocol::encode;
use crate::protocol::Compare;
use crate::protocol::DeleteRangeRequest;
use crate::protocol::PutRequest;
use crate::protocol::RangeRequest;
use crate::protocol::RangeResponse;
use crate::protocol::RequestOp;
use crate::protocol::TxnRequest;
use crate::protocol::TxnResponse;
use crate::Conf;
use crate::BACKEND_ID;

/// Implementation of the [`StoreBackend`] interface using etcd.
pub struct EtcdStore {
    /// Base URL of the etcd JSON gateway, without trailing slashes.
    base: String,

    /// HTTP client for unary requests, with a request timeout.
    client: reqwest::Client,

    /// HTTP client for long-lived watch requests, without a request timeout.
    watch_client: reqwest::Client,
}

impl EtcdStore {
    /// Initialise an etcd backed [`StoreBackend`].
    pub fn new(conf: &Conf) -> Result<Self> {
        let connect_timeout = Duration::from_secs(conf.timeout_connect_sec);
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(Duration::from_secs(conf.timeout_sec))
            .build()?;
        let watch_client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(EtcdStore {
            base: conf.address.trim_end_matches('/').to_string(),
            client,
            watch_client,
        })
    }

    /// Issue a request to the etcd gateway and decode its response.
    async fn call<B, R>(&self, endpoint: &str, body: &B) -> Result<R>
    where
        B: Serialize,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base, endpoint);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context(Unavailable)?;
        let response = check_status(response).await?;
        let response = response
            .json()
            .await
            .map_err(|error| anyhow::anyhow!(InvalidResponse(error.to_string())))?;
        Ok(response)
    }

    async fn txn(&self, request: &TxnRequest) -> Result<TxnResponse> {
        self.call("/v3/kv/txn", request).await
    }
}

#[async_trait::async_trait]
impl StoreBackend for EtcdStore {
    async fn delete(&self, _: &Context, key: &str, expected: ExpectedVersion) -> Result<()> {
        let (err_count, _timer) = observe_op(BACKEND_ID, "delete");
        let request = TxnRequest {
            compare: Compare::expect(key, expected).into_iter().collect(),
            success: vec![RequestOp::RequestDeleteRange(DeleteRangeRequest {
                key: encode(key.as_bytes()),
            })],
            failure: vec![RequestOp::RequestRange(RangeRequest::key(key))],
        };
        let result = match self.txn(&request).await {
            // Keys expected to be absent can't be deleted: a met guard means nothing to delete.
            Ok(response) if response.succeeded && expected == ExpectedVersion::Absent => {
                Err(anyhow::anyhow!(NotFound::new(key)))
            }
            Ok(response) if response.succeeded && response.deleted() == 0 => {
                Err(anyhow::anyhow!(NotFound::new(key)))
            }
            Ok(response) if response.succeeded => Ok(()),
            Ok(response) if response.range_found() => {
                Err(anyhow::anyhow!(VersionConflict::new(key)))
            }
            Ok(_) => Err(anyhow::anyhow!(NotFound::new(key))),
            Err(error) => Err(error),
        };
        count_error(&err_count, &result);
        result
    }

    async fn get(&self, _: &Context, key: &str) -> Result<StateRecord> {
        let (err_count, _timer) = observe_op(BACKEND_ID, "get");
        let result = self
            .call::<_, RangeResponse>("/v3/kv/range", &RangeRequest::key(key))
            .await
            .and_then(|response| match response.kvs.into_iter().next() {
                None => Err(anyhow::anyhow!(NotFound::new(key))),
                Some(kv) => kv.into_record(),
            });
        count_error(&err_count, &result);
        result
    }

    async fn list(&self, _: &Context, prefix: &str) -> Result<Vec<StateRecord>> {
        let (err_count, _timer) = observe_op(BACKEND_ID, "list");
        let result = self
            .call::<_, RangeResponse>("/v3/kv/range", &RangeRequest::prefix(prefix))
            .await
            .and_then(|response| {
                response
                    .kvs
                    .into_iter()
                    .map(|kv| kv.into_record())
                    .collect::<Result<Vec<_>>>()
            });
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
        let request = TxnRequest {
            compare: Compare::expect(key, expected).into_iter().collect(),
            success: vec![RequestOp::RequestPut(PutRequest {
                key: encode(key.as_bytes()),
                value: encode(&value),
            })],
            failure: Vec::new(),
        };
        let result = match self.txn(&request).await {
            Ok(response) if response.succeeded => Ok(Version::from(response.header.revision)),
            Ok(_) => Err(anyhow::anyhow!(VersionConflict::new(key))),
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
        let url = format!("{}/v3/watch", self.base);
        let stream = crate::watch::watch(self.watch_client.clone(), url, prefix, since);
        Ok(stream)
    }
}

/// Map HTTP error statuses onto state store errors.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
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

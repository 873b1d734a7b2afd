//! Forward authorised requests to the protected backend and relay its responses.
use std::time::Duration;

use actix_web::http::StatusCode;
use actix_web::web::Bytes;
use actix_web::web::Data;
use actix_web::HttpRequest;
use actix_web::HttpResponse;
use anyhow::Context as _;
use anyhow::Result;
use reqwest::header::HeaderMap;
use reqwest::header::HeaderName;
use reqwest::header::HeaderValue;

use authproxy_conf::UpstreamConf;
use authproxy_context::Context;

use super::metrics::Outcome;
use super::Error;

/// Request headers never forwarded to the backend.
const HOP_BY_HOP: [&str; 10] = [
    "connection",
    "content-length",
    "host",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// The backend could not be reached.
#[derive(Debug, thiserror::Error)]
#[error("the backend service is unreachable")]
pub struct BackendUnreachable;

/// The backend did not respond in time.
#[derive(Debug, thiserror::Error)]
#[error("the backend service did not respond in time")]
pub struct BackendTimeout;

/// The configured backend address is not a valid HTTP(S) URL.
#[derive(Debug, thiserror::Error)]
#[error("invalid backend address '{0}'")]
pub struct InvalidBackendAddress(String);

/// Unable to load the CA bundle to verify the backend with.
#[derive(Debug, thiserror::Error)]
#[error("unable to load backend CA bundle from '{0}'")]
pub struct InvalidCaBundle(String);

/// HTTP client to reissue requests to the backend.
#[derive(Clone, Debug)]
pub struct Forwarder {
    base: String,
    client: reqwest::Client,
    relay: Vec<HeaderName>,
    token_header: HeaderName,
}

impl Forwarder {
    /// Configure a client for the backend, stripping `token_header` from forwarded requests.
    pub fn new(conf: &UpstreamConf, token_header: &str) -> Result<Forwarder> {
        let base = conf.address.trim_end_matches('/').to_string();
        let url = reqwest::Url::parse(&base)
            .with_context(|| InvalidBackendAddress(conf.address.clone()))?;
        if !matches!(url.scheme(), "http" | "https") {
            anyhow::bail!(InvalidBackendAddress(conf.address.clone()));
        }

        let mut client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(conf.timeout_connect_sec))
            .timeout(Duration::from_secs(conf.timeout_sec))
            .redirect(reqwest::redirect::Policy::none())
            .danger_accept_invalid_certs(conf.insecure_skip_verify);
        if let Some(bundle) = &conf.ca_bundle {
            let pem = std::fs::read(bundle).with_context(|| InvalidCaBundle(bundle.clone()))?;
            let certs = reqwest::Certificate::from_pem_bundle(&pem)
                .with_context(|| InvalidCaBundle(bundle.clone()))?;
            for cert in certs {
                client = client.add_root_certificate(cert);
            }
        }
        let client = client.build()?;

        let relay = conf
            .relay_headers
            .iter()
            .map(|name| HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes()))
            .collect::<Result<Vec<_>, _>>()?;
        let token_header = HeaderName::from_bytes(token_header.to_ascii_lowercase().as_bytes())?;
        Ok(Forwarder {
            base,
            client,
            relay,
            token_header,
        })
    }

    /// Reissue the request to the backend and relay the response.
    pub async fn forward(
        &self,
        context: &Context,
        request: &HttpRequest,
        body: Bytes,
    ) -> Result<HttpResponse> {
        // Only send paths that can't resolve to a location other than the authorised one.
        super::path::check(request.path())?;
        let method = reqwest::Method::from_bytes(request.method().as_str().as_bytes())?;
        let path = request
            .uri()
            .path_and_query()
            .map(|path| path.as_str())
            .unwrap_or("/");
        let url = format!("{}{}", self.base, path);
        let headers = self.request_headers(request)?;

        slog::debug!(context.logger, "Forwarding request to backend"; "url" => &url);
        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await
            .map_err(classify)?;

        let status = StatusCode::from_u16(response.status().as_u16())?;
        let mut relay = HttpResponse::build(status);
        for (name, value) in response.headers() {
            if self.relay.contains(name) {
                relay.append_header((name.as_str(), value.as_bytes()));
            }
        }
        Ok(relay.streaming(response.bytes_stream()))
    }

    /// Copy the client request headers to forward, adding the `X-Forwarded-*` headers.
    fn request_headers(&self, request: &HttpRequest) -> Result<HeaderMap> {
        // Headers named by the client's Connection header only apply to the client connection.
        let connection: Vec<String> = request
            .headers()
            .get_all("connection")
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(','))
            .map(|name| name.trim().to_ascii_lowercase())
            .filter(|name| !name.is_empty())
            .collect();

        let mut headers = HeaderMap::new();
        let mut forwarded_for = None;
        for (name, value) in request.headers() {
            let name = name.as_str();
            if name == self.token_header.as_str()
                || name.starts_with("proxy-")
                || HOP_BY_HOP.contains(&name)
                || connection.iter().any(|listed| listed == name)
            {
                continue;
            }
            if name == "x-forwarded-for" {
                forwarded_for = value.to_str().ok().map(str::to_string);
                continue;
            }
            if name == "x-forwarded-proto" {
                continue;
            }
            headers.append(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_bytes(value.as_bytes())?,
            );
        }

        if let Some(peer) = request.peer_addr() {
            let peer = peer.ip().to_string();
            forwarded_for = match forwarded_for {
                Some(chain) => Some(format!("{}, {}", chain, peer)),
                None => Some(peer),
            };
        }
        if let Some(chain) = forwarded_for {
            headers.insert("x-forwarded-for", HeaderValue::from_str(&chain)?);
        }
        headers.insert("x-forwarded-proto", HeaderValue::from_static("https"));
        Ok(headers)
    }
}

/// Distinguish backend timeouts from other failures to reach it.
fn classify(error: reqwest::Error) -> anyhow::Error {
    if error.is_timeout() {
        anyhow::Error::new(error).context(BackendTimeout)
    } else {
        anyhow::Error::new(error).context(BackendUnreachable)
    }
}

/// Forward requests for any path the proxy does not handle itself.
pub async fn forward(
    context: Context,
    forwarder: Data<Forwarder>,
    request: HttpRequest,
    body: Bytes,
) -> Result<HttpResponse, Error> {
    match forwarder.forward(&context, &request, body).await {
        Ok(response) => {
            super::metrics::observe(Outcome::Forwarded);
            Ok(response)
        }
        Err(error) => {
            super::metrics::observe(Outcome::BackendError);
            slog::warn!(
                context.logger, "Unable to forward request to backend";
                "error" => format!("{:#}", error),
            );
            Err(Error::from(error))
        }
    }
}

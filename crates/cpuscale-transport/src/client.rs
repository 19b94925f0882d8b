//! JSON-over-HTTP client for the control endpoint.
//!
//! Each attempt opens a fresh HTTP/1.1 connection, sends one request and
//! reads the whole response. There is no per-attempt timeout; a stuck
//! attempt is only abandoned through the cancellation signal.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, Request, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tracing::debug;

use cpuscale_core::{CancelSignal, Settings};

use crate::error::{AttemptError, TransportError, TransportResult};
use crate::retry::RetryPolicy;
use crate::Transport;

const USER_AGENT_VALUE: &str = concat!("cpuscale/", env!("CARGO_PKG_VERSION"));
const JSON: &str = "application/json";

/// Where a request goes: socket address, `Host` header, request target.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Endpoint {
    addr: String,
    host: String,
    path: String,
}

impl Endpoint {
    fn parse(url: &str) -> TransportResult<Self> {
        let invalid = |reason: &str| TransportError::InvalidUrl {
            url: url.to_string(),
            reason: reason.to_string(),
        };

        let uri: Uri = url.parse().map_err(|_| invalid("not a valid URI"))?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid("only http:// is supported"));
        }
        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
        let port = authority.port_u16().unwrap_or(80);
        let path = uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .filter(|pq| !pq.is_empty())
            .unwrap_or("/");

        Ok(Self {
            addr: format!("{}:{port}", authority.host()),
            host: authority.as_str().to_string(),
            path: path.to_string(),
        })
    }
}

/// HTTP implementation of [`Transport`].
#[derive(Debug, Clone)]
pub struct RestClient {
    policy: RetryPolicy,
}

impl RestClient {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(RetryPolicy::from_settings(settings))
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// One GET attempt: 2xx with a JSON body, or an error.
    async fn fetch_json(&self, endpoint: &Endpoint) -> Result<serde_json::Value, AttemptError> {
        let body = send(Method::GET, endpoint, None).await?;
        serde_json::from_slice(&body).map_err(AttemptError::Decode)
    }
}

#[async_trait]
impl Transport for RestClient {
    async fn get(&self, url: &str, cancel: &CancelSignal) -> TransportResult<serde_json::Value> {
        let endpoint = Endpoint::parse(url)?;
        let endpoint = &endpoint;
        let operation = format!("GET {url}");

        let value = self
            .policy
            .run(&operation, cancel, move |_| self.fetch_json(endpoint))
            .await?;
        debug!(%url, payload = %value, "fetched");
        Ok(value)
    }

    async fn put(
        &self,
        url: &str,
        body: &serde_json::Value,
        cancel: &CancelSignal,
    ) -> TransportResult<()> {
        let endpoint = Endpoint::parse(url)?;
        let endpoint = &endpoint;
        let payload = Bytes::from(serde_json::to_vec(body)?);
        let operation = format!("PUT {url}");

        self.policy
            .run(&operation, cancel, move |_| {
                let payload = payload.clone();
                async move { send(Method::PUT, endpoint, Some(payload)).await.map(|_| ()) }
            })
            .await?;
        debug!(%url, %body, "stored");
        Ok(())
    }
}

/// Perform a single HTTP exchange and return the response body of a 2xx.
async fn send(
    method: Method,
    endpoint: &Endpoint,
    body: Option<Bytes>,
) -> Result<Bytes, AttemptError> {
    let stream = TcpStream::connect(endpoint.addr.as_str())
        .await
        .map_err(AttemptError::Connect)?;

    let io = TokioIo::new(stream);
    let (mut sender, conn) = hyper::client::conn::http1::handshake(io).await?;

    // Drive the connection in the background.
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            debug!(error = %e, "connection closed with error");
        }
    });

    let mut builder = Request::builder()
        .method(method)
        .uri(endpoint.path.as_str())
        .header(HOST, endpoint.host.as_str())
        .header(USER_AGENT, USER_AGENT_VALUE)
        .header(ACCEPT, JSON);
    if body.is_some() {
        builder = builder.header(CONTENT_TYPE, JSON);
    }
    let req = builder.body(Full::new(body.unwrap_or_default()))?;

    let resp = sender.send_request(req).await?;
    let status = resp.status();
    let bytes = resp.into_body().collect().await?.to_bytes();

    if !status.is_success() {
        return Err(AttemptError::Status(status));
    }
    Ok(bytes)
}

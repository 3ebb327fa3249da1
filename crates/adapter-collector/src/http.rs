//! HTTP backends for the query, check and subscription traits.
//!
//! Each request opens its own HTTP/1 connection; backends are polled at
//! collector intervals, so there is nothing worth pooling. Response
//! decoding is kept in pure functions so it can be tested without a
//! server.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;
use url::{form_urlencoded, Url};

use adapter_core::config::EndpointConfig;

use crate::backend::{CheckClient, EventTypeStats, QueryClient, SubscriptionClient, TokenSource};
use crate::error::{CollectorError, CollectorResult};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "hpa-adapter/0.1";

/// A parsed `http://host[:port][/base]` endpoint. Credentials, query and
/// fragment are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    authority: String,
    base_path: String,
}

impl Endpoint {
    pub fn parse(endpoint: &str) -> CollectorResult<Self> {
        let invalid = |reason: String| CollectorError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason,
        };

        let url = Url::parse(endpoint).map_err(|e| invalid(e.to_string()))?;
        if url.scheme() != "http" {
            return Err(invalid("only http:// endpoints are supported".into()));
        }
        let host = url.host().ok_or_else(|| invalid("missing host".into()))?;
        let port = url
            .port_or_known_default()
            .ok_or_else(|| invalid("missing port".into()))?;

        Ok(Self {
            authority: format!("{host}:{port}"),
            base_path: url.path().trim_end_matches('/').to_string(),
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }

    fn uri(&self, path: &str) -> String {
        format!("http://{}{}{}", self.authority, self.base_path, path)
    }
}

/// Encode `pairs` as an `application/x-www-form-urlencoded` body.
pub fn form_encode(pairs: &[(&str, &str)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

/// Send a request to `path` below `endpoint` and return the response body
/// of a 2xx response. `body` carries the content type and payload.
async fn send(
    endpoint: &Endpoint,
    method: http::Method,
    path: &str,
    bearer: Option<String>,
    body: Option<(&str, Bytes)>,
    timeout: Duration,
) -> CollectorResult<Bytes> {
    let uri = endpoint.uri(path);
    let (content_type, body) = match body {
        Some((content_type, body)) => (Some(content_type), body),
        None => (None, Bytes::new()),
    };

    let exchange = async {
        let stream = tokio::net::TcpStream::connect(endpoint.authority())
            .await
            .map_err(|e| CollectorError::Http(format!("connect {uri}: {e}")))?;
        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| CollectorError::Http(format!("handshake {uri}: {e}")))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "backend connection closed");
            }
        });

        let mut req = http::Request::builder()
            .method(method)
            .uri(&uri)
            .header(http::header::HOST, endpoint.authority())
            .header(http::header::USER_AGENT, USER_AGENT)
            .header(http::header::ACCEPT, "application/json");
        if let Some(content_type) = content_type {
            req = req.header(http::header::CONTENT_TYPE, content_type);
        }
        if let Some(token) = bearer {
            req = req.header(http::header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = req
            .body(Full::new(body))
            .map_err(|e| CollectorError::Http(format!("build request {uri}: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| CollectorError::Http(format!("request {uri}: {e}")))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| CollectorError::Http(format!("read body {uri}: {e}")))?
            .to_bytes();

        if !status.is_success() {
            debug!(%status, %uri, "backend returned non-2xx");
            return Err(CollectorError::Http(format!(
                "{uri} returned {status}: {}",
                String::from_utf8_lossy(&bytes)
            )));
        }
        Ok::<_, CollectorError>(bytes)
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| CollectorError::Http(format!("{uri} timed out after {timeout:?}")))?
}

fn endpoint_timeout(config: &EndpointConfig) -> CollectorResult<Duration> {
    Ok(config.timeout()?.unwrap_or(DEFAULT_TIMEOUT))
}

// ── Prometheus ──────────────────────────────────────────────────

/// Instant-query client for a Prometheus-compatible HTTP API.
#[derive(Debug, Clone)]
pub struct PrometheusClient {
    endpoint: Endpoint,
    timeout: Duration,
}

impl PrometheusClient {
    pub fn new(endpoint: Endpoint, timeout: Duration) -> Self {
        Self { endpoint, timeout }
    }

    pub fn from_config(config: &EndpointConfig) -> CollectorResult<Self> {
        Ok(Self::new(
            Endpoint::parse(&config.endpoint)?,
            endpoint_timeout(config)?,
        ))
    }
}

#[async_trait]
impl QueryClient for PrometheusClient {
    async fn query(&self, query: &str) -> CollectorResult<f64> {
        let body = form_encode(&[("query", query)]);
        let bytes = send(
            &self.endpoint,
            http::Method::POST,
            "/api/v1/query",
            None,
            Some(("application/x-www-form-urlencoded", Bytes::from(body))),
            self.timeout,
        )
        .await?;
        parse_query_response(&bytes)
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    status: String,
    #[serde(default)]
    data: Option<QueryData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "resultType", content = "result", rename_all = "lowercase")]
enum QueryData {
    Scalar((f64, String)),
    Vector(Vec<VectorSample>),
    Matrix(Value),
    #[serde(rename = "string")]
    Text(Value),
}

#[derive(Deserialize)]
struct VectorSample {
    value: (f64, String),
}

/// Decode an instant-query response. The result must be a scalar or a
/// vector with exactly one sample.
pub fn parse_query_response(body: &[u8]) -> CollectorResult<f64> {
    let resp: QueryResponse =
        serde_json::from_slice(body).map_err(|e| CollectorError::Decode(e.to_string()))?;
    if resp.status != "success" {
        return Err(CollectorError::Backend(
            resp.error.unwrap_or_else(|| format!("query status {}", resp.status)),
        ));
    }

    let raw = match resp.data {
        Some(QueryData::Scalar((_, value))) => value,
        Some(QueryData::Vector(mut samples)) => {
            if samples.len() != 1 {
                return Err(CollectorError::UnexpectedValueCount(samples.len()));
            }
            samples.remove(0).value.1
        }
        Some(QueryData::Matrix(_)) | Some(QueryData::Text(_)) => {
            return Err(CollectorError::Decode(
                "query must return a scalar or a vector".into(),
            ));
        }
        None => return Err(CollectorError::Decode("response has no data".into())),
    };

    raw.parse::<f64>()
        .map_err(|_| CollectorError::InvalidNumber(raw))
}

// ── KairosDB ────────────────────────────────────────────────────

/// Check-result client reading the datapoint store behind the check
/// service. Check `N` is stored as metric `zmon.check.N`.
#[derive(Clone)]
pub struct KairosClient {
    endpoint: Endpoint,
    token: Arc<dyn TokenSource>,
    timeout: Duration,
}

impl KairosClient {
    pub fn new(endpoint: Endpoint, token: Arc<dyn TokenSource>, timeout: Duration) -> Self {
        Self {
            endpoint,
            token,
            timeout,
        }
    }

    pub fn from_config(
        config: &EndpointConfig,
        token: Arc<dyn TokenSource>,
    ) -> CollectorResult<Self> {
        Ok(Self::new(
            Endpoint::parse(&config.endpoint)?,
            token,
            endpoint_timeout(config)?,
        ))
    }
}

/// Request body selecting the newest datapoint of one check result key.
pub fn kairos_query(check_id: &str, key: &str, window: Duration) -> Value {
    json!({
        "start_relative": {
            "value": window.as_secs().max(1),
            "unit": "seconds",
        },
        "metrics": [{
            "name": format!("zmon.check.{check_id}"),
            "limit": 1,
            "order": "desc",
            "tags": { "key": [key] },
            "group_by": [{ "name": "tag", "tags": ["entity", "key"] }],
        }],
    })
}

#[async_trait]
impl CheckClient for KairosClient {
    async fn latest(&self, check_id: &str, key: &str, window: Duration) -> CollectorResult<f64> {
        let body = serde_json::to_vec(&kairos_query(check_id, key, window))
            .map_err(|e| CollectorError::Decode(e.to_string()))?;
        let token = self.token.token()?;
        let bytes = send(
            &self.endpoint,
            http::Method::POST,
            "/api/v1/datapoints/query",
            Some(token),
            Some(("application/json", Bytes::from(body))),
            self.timeout,
        )
        .await?;
        parse_kairos_response(&bytes)
    }
}

#[derive(Deserialize)]
struct KairosResponse {
    #[serde(default)]
    queries: Vec<KairosQueryResult>,
}

#[derive(Deserialize)]
struct KairosQueryResult {
    #[serde(default)]
    results: Vec<KairosSeries>,
}

#[derive(Deserialize)]
struct KairosSeries {
    #[serde(default)]
    values: Vec<(i64, f64)>,
}

/// Decode a datapoint query response into its newest value.
pub fn parse_kairos_response(body: &[u8]) -> CollectorResult<f64> {
    let resp: KairosResponse =
        serde_json::from_slice(body).map_err(|e| CollectorError::Decode(e.to_string()))?;

    let mut latest: Option<(i64, f64)> = None;
    for (ts, value) in resp
        .queries
        .iter()
        .flat_map(|q| &q.results)
        .flat_map(|s| &s.values)
    {
        if latest.is_none_or(|(newest, _)| *ts > newest) {
            latest = Some((*ts, *value));
        }
    }
    latest.map(|(_, v)| v).ok_or(CollectorError::NoValues)
}

// ── Nakadi ──────────────────────────────────────────────────────

/// Subscription-stats client for a Nakadi event bus.
#[derive(Clone)]
pub struct NakadiClient {
    endpoint: Endpoint,
    token: Arc<dyn TokenSource>,
    timeout: Duration,
}

impl NakadiClient {
    pub fn new(endpoint: Endpoint, token: Arc<dyn TokenSource>, timeout: Duration) -> Self {
        Self {
            endpoint,
            token,
            timeout,
        }
    }

    pub fn from_config(
        config: &EndpointConfig,
        token: Arc<dyn TokenSource>,
    ) -> CollectorResult<Self> {
        Ok(Self::new(
            Endpoint::parse(&config.endpoint)?,
            token,
            endpoint_timeout(config)?,
        ))
    }
}

/// Path of the stats resource of `subscription_id`, asking for time lag.
pub fn subscription_stats_path(subscription_id: &str) -> String {
    let id: String = form_urlencoded::byte_serialize(subscription_id.as_bytes()).collect();
    format!("/subscriptions/{id}/stats?show_time_lag=true")
}

#[async_trait]
impl SubscriptionClient for NakadiClient {
    async fn stats(&self, subscription_id: &str) -> CollectorResult<Vec<EventTypeStats>> {
        let token = self.token.token()?;
        let bytes = send(
            &self.endpoint,
            http::Method::GET,
            &subscription_stats_path(subscription_id),
            Some(token),
            None,
            self.timeout,
        )
        .await?;
        parse_subscription_stats(&bytes)
    }
}

#[derive(Deserialize)]
struct SubscriptionStatsResponse {
    #[serde(default)]
    items: Vec<EventTypeStats>,
}

/// Decode a subscription stats response into per-event-type statistics.
pub fn parse_subscription_stats(body: &[u8]) -> CollectorResult<Vec<EventTypeStats>> {
    let resp: SubscriptionStatsResponse =
        serde_json::from_slice(body).map_err(|e| CollectorError::Decode(e.to_string()))?;
    Ok(resp.items)
}

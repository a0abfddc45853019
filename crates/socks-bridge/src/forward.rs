//! HTTP pass-through forwarding
//!
//! Independent of the SOCKS5 core: a caller describes an upstream request as
//! `{url, method, headers, data}` and gets the upstream status, headers and
//! body back unmodified.

use crate::config::ForwardConfig;
use crate::error::{BridgeError, Result};
use crate::metrics::BridgeMetrics;
use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, error, warn};

/// Hop-by-hop headers that are never copied between connections
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Upstream request described by the caller
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardRequest {
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub method: Option<String>,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Request body; strings are sent as-is, anything else as JSON
    #[serde(default)]
    pub data: Option<Value>,
}

/// Query form accepted by the universal endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ForwardQuery {
    pub url: Option<String>,
    pub method: Option<String>,
    /// JSON object of headers
    pub headers: Option<String>,
    pub data: Option<String>,
}

impl ForwardQuery {
    pub fn into_request(self) -> std::result::Result<ForwardRequest, ForwardRejection> {
        let headers = match self.headers {
            Some(raw) => serde_json::from_str(&raw)
                .map_err(|_| ForwardRejection::bad_request("Invalid headers JSON"))?,
            None => HashMap::new(),
        };

        Ok(ForwardRequest {
            url: self.url,
            method: self.method,
            headers,
            data: self.data.map(Value::String),
        })
    }
}

/// A request refused before reaching upstream
#[derive(Debug, Clone)]
pub struct ForwardRejection {
    pub status: StatusCode,
    pub body: Value,
}

impl ForwardRejection {
    pub fn bad_request(message: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({ "error": message }),
        }
    }

    pub fn method_not_allowed() -> Self {
        Self {
            status: StatusCode::METHOD_NOT_ALLOWED,
            body: json!({ "error": "Method not allowed" }),
        }
    }

    pub fn usage(path: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: json!({
                "error": "Invalid request method",
                "usage": {
                    "GET with query params": format!("{}?url=https://example.com&method=GET", path),
                    "POST with JSON body": format!(
                        "POST {} with {{\"url\": \"https://example.com\", \"method\": \"GET\"}}",
                        path
                    ),
                }
            }),
        }
    }
}

impl IntoResponse for ForwardRejection {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Parse a JSON body into a [`ForwardRequest`]
pub fn parse_body(body: &[u8]) -> std::result::Result<ForwardRequest, ForwardRejection> {
    serde_json::from_slice(body).map_err(|_| ForwardRejection::bad_request("Invalid JSON"))
}

/// Forwards described requests with a shared client
#[derive(Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    user_agent: String,
    metrics: BridgeMetrics,
}

impl HttpForwarder {
    pub fn new(config: &ForwardConfig, metrics: BridgeMetrics) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| BridgeError::forward(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
            metrics,
        })
    }

    /// Forward one request and mirror the upstream response
    pub async fn forward(&self, request: ForwardRequest) -> Response {
        match self.forward_inner(request).await {
            Ok(response) => {
                self.metrics.record_forward("forwarded");
                response
            }
            Err(rejection) => {
                self.reject(&rejection);
                rejection.into_response()
            }
        }
    }

    /// Count a request that never produced an upstream response
    pub fn reject(&self, rejection: &ForwardRejection) {
        let label = if rejection.status.is_server_error() {
            "upstream_failed"
        } else {
            "rejected"
        };
        self.metrics.record_forward(label);
    }

    async fn forward_inner(
        &self,
        request: ForwardRequest,
    ) -> std::result::Result<Response, ForwardRejection> {
        let url = request
            .url
            .as_deref()
            .filter(|url| !url.is_empty())
            .ok_or_else(|| ForwardRejection::bad_request("URL is required"))?;

        let url = reqwest::Url::parse(url)
            .ok()
            .filter(|url| matches!(url.scheme(), "http" | "https"))
            .ok_or_else(|| ForwardRejection::bad_request("Invalid URL"))?;

        let method_name = request.method.as_deref().unwrap_or("GET").to_uppercase();
        let method = Method::from_bytes(method_name.as_bytes())
            .map_err(|_| ForwardRejection::bad_request("Invalid method"))?;

        let headers = self.build_headers(&request.headers);
        let body = body_bytes(request.data);

        debug!("Forwarding {} {}", method, url);

        let mut upstream = self.client.request(method.clone(), url.clone()).headers(headers);
        if let Some(body) = body {
            if method != Method::GET && method != Method::HEAD {
                upstream = upstream.body(body);
            }
        }

        let response = upstream.send().await.map_err(|e| {
            error!("Proxy request to {} failed: {}", url, e);
            ForwardRejection {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                body: json!({ "error": "Proxy request failed", "details": e.to_string() }),
            }
        })?;

        let status = response.status();
        let upstream_headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            error!("Reading response from {} failed: {}", url, e);
            ForwardRejection {
                status: StatusCode::BAD_GATEWAY,
                body: json!({ "error": "Proxy request failed", "details": e.to_string() }),
            }
        })?;

        let mut builder = Response::builder().status(status);
        if let Some(headers) = builder.headers_mut() {
            copy_end_to_end(&upstream_headers, headers);
        }

        builder.body(Body::from(body)).map_err(|e| ForwardRejection {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({ "error": "Internal server error", "details": e.to_string() }),
        })
    }

    fn build_headers(&self, requested: &HashMap<String, String>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&self.user_agent) {
            headers.insert(header::USER_AGENT, value);
        }
        headers.insert(header::ACCEPT, HeaderValue::from_static("*/*"));

        for (name, value) in requested {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    if !is_hop_by_hop(&name) && name != header::HOST {
                        headers.insert(name, value);
                    }
                }
                _ => warn!("Skipping invalid header {:?}", name),
            }
        }

        headers
    }
}

fn body_bytes(data: Option<Value>) -> Option<Bytes> {
    match data? {
        Value::Null => None,
        Value::String(text) => Some(Bytes::from(text)),
        other => Some(Bytes::from(other.to_string())),
    }
}

fn is_hop_by_hop(name: &HeaderName) -> bool {
    HOP_BY_HOP.contains(&name.as_str())
}

fn copy_end_to_end(from: &HeaderMap, to: &mut HeaderMap) {
    for (name, value) in from {
        if !is_hop_by_hop(name) && name != header::CONTENT_LENGTH {
            to.append(name.clone(), value.clone());
        }
    }
}

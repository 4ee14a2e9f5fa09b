use std::time::Duration;

use async_trait::async_trait;
use edge_config::SystemConfig;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::Method;

use crate::types::{header_value, HeaderList};
use crate::{Forwarder, ProxyError, ResponseBody, UpstreamRequest, UpstreamResponse};

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Clone, Debug)]
pub struct HttpForwarderConfig {
    pub timeout_ms: u64,
    /// Sent only when the client supplied no user agent. Empty disables.
    pub user_agent: String,
}

impl Default for HttpForwarderConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            user_agent: String::new(),
        }
    }
}

impl HttpForwarderConfig {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            timeout_ms: config.get_number("proxy.timeout_ms").max(1) as u64,
            user_agent: config.get_string("proxy.user_agent"),
        }
    }
}

#[derive(Clone)]
pub struct HttpForwarder {
    client: reqwest::Client,
    config: HttpForwarderConfig,
}

impl HttpForwarder {
    pub fn new(config: HttpForwarderConfig) -> Result<Self, ProxyError> {
        let timeout = Duration::from_millis(config.timeout_ms.max(1));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|err| ProxyError::Internal(err.to_string()))?;
        Ok(Self { client, config })
    }

    async fn send_request(&self, upstream: &UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        let method = Method::from_bytes(upstream.method.as_bytes())
            .map_err(|err| ProxyError::BadRequest(err.to_string()))?;
        let connection_tokens = connection_tokens(&upstream.headers);
        let mut headers = HeaderMap::new();
        let mut has_user_agent = false;
        for (key, value) in &upstream.headers {
            let lower = key.to_ascii_lowercase();
            if is_hop_by_hop(&lower)
                || lower == "host"
                || lower == "content-length"
                || connection_tokens.contains(&lower)
            {
                continue;
            }
            if lower == "user-agent" {
                has_user_agent = true;
            }
            if let (Ok(name), Ok(value)) =
                (HeaderName::from_bytes(lower.as_bytes()), HeaderValue::from_str(value))
            {
                headers.append(name, value);
            }
        }
        if !has_user_agent && !self.config.user_agent.is_empty() {
            if let Ok(value) = HeaderValue::from_str(&self.config.user_agent) {
                headers.insert(USER_AGENT, value);
            }
        }

        let request = self
            .client
            .request(method, &upstream.url)
            .headers(headers)
            .body(upstream.body.clone());
        let response = request.send().await.map_err(|err| {
            if err.is_timeout() {
                ProxyError::Timeout(err.to_string())
            } else if err.is_builder() {
                ProxyError::BadRequest(err.to_string())
            } else {
                ProxyError::Upstream(err.to_string())
            }
        })?;
        Ok(response_to_upstream(response))
    }
}

#[async_trait]
impl Forwarder for HttpForwarder {
    async fn send(&self, upstream: &UpstreamRequest) -> Result<UpstreamResponse, ProxyError> {
        self.send_request(upstream).await
    }
}

fn response_to_upstream(resp: reqwest::Response) -> UpstreamResponse {
    let status = resp.status().as_u16();
    let headers = collect_headers(resp.headers());
    let stream = resp.bytes_stream().map(|item| {
        item.map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))
    });
    UpstreamResponse {
        status,
        headers,
        body: ResponseBody::Stream(Box::pin(stream)),
    }
}

fn collect_headers(resp: &HeaderMap) -> HeaderList {
    let tokens = resp
        .get(reqwest::header::CONNECTION)
        .and_then(|value| value.to_str().ok())
        .map(split_tokens)
        .unwrap_or_default();
    let mut headers = Vec::new();
    for (name, value) in resp {
        let name = name.as_str().to_lowercase();
        if is_hop_by_hop(&name) || tokens.contains(&name) {
            continue;
        }
        if let Ok(value) = value.to_str() {
            headers.push((name, value.to_string()));
        }
    }
    headers
}

pub(crate) fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP.iter().any(|hop| hop.eq_ignore_ascii_case(name))
}

/// Header names listed in `Connection` are hop-by-hop for this message only.
fn connection_tokens(headers: &HeaderList) -> Vec<String> {
    header_value(headers, "connection")
        .map(split_tokens)
        .unwrap_or_default()
}

fn split_tokens(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect()
}

mod forwarder;
mod images;
mod pattern;
mod rule;
mod types;

pub use edge_config::RewritePhase;
pub use forwarder::{HttpForwarder, HttpForwarderConfig};
pub use images::{
    ImageDomainAllowlist, ImagePolicy, ImageRequest, ImageSource, MAX_IMAGE_URL_LENGTH,
};
pub use pattern::{PathPattern, Repeat, Segment};
pub use rule::{DestinationTemplate, RewriteRule, RewriteTable, RewriteTarget};
pub use types::{
    header_value, set_header, HeaderList, HttpRequest, HttpResponse, ResponseBody,
    UpstreamRequest, UpstreamResponse,
};

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use edge_config::SystemConfig;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const IMAGE_CONTENT_SECURITY_POLICY: &str = "script-src 'none'; frame-src 'none'; sandbox;";

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("invalid rewrite source {pattern:?}: {reason}")]
    InvalidSource { pattern: String, reason: String },
    #[error("invalid rewrite destination {destination:?}: {reason}")]
    InvalidDestination { destination: String, reason: String },
    #[error("rewrite {rule:?}: destination uses :{param}, which the source does not capture")]
    UnknownParam { param: String, rule: String },
    #[error("rewrite {rule:?}: captured :{param} is never used in the destination")]
    UnusedParam { param: String, rule: String },
    #[error("rewrite {rule:?}: captured :{param} appears more than once in the destination")]
    DuplicateParam { param: String, rule: String },
}

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("upstream timeout: {0}")]
    Timeout(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("upstream image response failed with status {status}")]
    Upstream { status: u16 },
    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn send(&self, upstream: &UpstreamRequest) -> Result<UpstreamResponse, ProxyError>;
}

#[derive(Clone, Debug)]
pub struct ProxySettings {
    /// Append `x-forwarded-for/-host/-proto/-port` to proxied requests.
    pub xfwd: bool,
}

impl Default for ProxySettings {
    fn default() -> Self {
        Self { xfwd: true }
    }
}

impl ProxySettings {
    pub fn from_config(config: &SystemConfig) -> Self {
        Self {
            xfwd: config.get_bool("proxy.xfwd"),
        }
    }
}

/// Compiled routing state shared by every request handler. Built once from the
/// configuration and never mutated afterwards.
pub struct EdgeKernel {
    rewrites: RewriteTable,
    images: ImagePolicy,
    settings: ProxySettings,
    forwarder: Arc<dyn Forwarder>,
}

impl EdgeKernel {
    pub fn new(
        rewrites: RewriteTable,
        images: ImagePolicy,
        settings: ProxySettings,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        Self {
            rewrites,
            images,
            settings,
            forwarder,
        }
    }

    pub fn from_config(
        config: &SystemConfig,
        forwarder: Arc<dyn Forwarder>,
    ) -> Result<Self, RewriteError> {
        let rewrites = RewriteTable::from_specs(&config.rewrites())?;
        for rule in rewrites.rules() {
            debug!(
                source = rule.source(),
                destination = rule.destination(),
                phase = rule.phase().as_str(),
                "rewrite installed"
            );
        }
        Ok(Self::new(
            rewrites,
            ImagePolicy::from_config(config),
            ProxySettings::from_config(config),
            forwarder,
        ))
    }

    pub fn rewrites(&self) -> &RewriteTable {
        &self.rewrites
    }

    pub fn images(&self) -> &ImagePolicy {
        &self.images
    }

    pub fn resolve(
        &self,
        phase: RewritePhase,
        path: &str,
        query: Option<&str>,
    ) -> Option<RewriteTarget> {
        self.rewrites.resolve(phase, path, query)
    }

    /// Forwards `req` to `target` and relays the upstream response as is.
    pub async fn proxy(
        &self,
        req: HttpRequest,
        target: &RewriteTarget,
    ) -> Result<HttpResponse, ProxyError> {
        let request_id = Uuid::new_v4().to_string();
        let start = Instant::now();
        let mut headers = req.headers.clone();
        if self.settings.xfwd {
            append_forwarded_headers(&mut headers, &req);
        }
        let upstream = UpstreamRequest {
            method: req.method.clone(),
            url: target.url.clone(),
            headers,
            body: req.body,
        };
        debug!(
            request_id = %request_id,
            method = %upstream.method,
            path = %req.path,
            rule = %target.rule_source,
            "forwarding request"
        );

        match self.forwarder.send(&upstream).await {
            Ok(response) => {
                info!(
                    request_id = %request_id,
                    method = %upstream.method,
                    target = %upstream.url,
                    status = response.status,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "proxied request"
                );
                Ok(response.into())
            }
            Err(err) => {
                warn!(
                    request_id = %request_id,
                    method = %upstream.method,
                    target = %upstream.url,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    error = %err,
                    "proxy request failed"
                );
                Err(err)
            }
        }
    }

    /// Serves `/_next/image`: validates the query, fetches the source image
    /// and relays it when the upstream answered with an image.
    pub async fn serve_image(&self, req: &HttpRequest) -> Result<HttpResponse, ImageError> {
        let image = self.images.parse_request(req.query.as_deref())?;
        let upstream = match &image.source {
            ImageSource::Remote(url) => UpstreamRequest {
                method: "GET".to_string(),
                url: url.to_string(),
                headers: Vec::new(),
                body: Vec::new(),
            },
            ImageSource::Local(href) => {
                let (path, query) = match href.split_once('?') {
                    Some((path, query)) => (path, Some(query)),
                    None => (href.as_str(), None),
                };
                let target = self.rewrites.resolve_any(path, query).ok_or_else(|| {
                    ImageError::NotFound(format!("no route serves local image {path}"))
                })?;
                let headers = req
                    .headers
                    .iter()
                    .filter(|(name, _)| !matches!(name.as_str(), "accept-encoding" | "range"))
                    .cloned()
                    .collect();
                UpstreamRequest {
                    method: "GET".to_string(),
                    url: target.url,
                    headers,
                    body: Vec::new(),
                }
            }
        };

        let response = self.forwarder.send(&upstream).await?;
        if !(200..300).contains(&response.status) {
            warn!(
                url = %upstream.url,
                status = response.status,
                "upstream image response failed"
            );
            return Err(ImageError::Upstream {
                status: response.status,
            });
        }
        let content_type = self
            .images
            .check_content_type(header_value(&response.headers, "content-type"))?;
        debug!(
            url = %upstream.url,
            width = image.width,
            quality = image.quality,
            content_type = %content_type,
            "serving image"
        );

        let mut headers: HeaderList = response
            .headers
            .into_iter()
            .filter(|(name, _)| matches!(name.as_str(), "etag" | "last-modified" | "content-length"))
            .collect();
        set_header(&mut headers, "content-type", content_type);
        set_header(&mut headers, "content-security-policy", IMAGE_CONTENT_SECURITY_POLICY);
        set_header(&mut headers, "x-content-type-options", "nosniff");
        set_header(&mut headers, "vary", "Accept");
        Ok(HttpResponse {
            status: 200,
            headers,
            body: response.body,
        })
    }
}

/// Mirrors the usual reverse-proxy convention: `for`, `port` and `proto` are
/// appended to any values already present, `host` is set only when absent.
fn append_forwarded_headers(headers: &mut HeaderList, req: &HttpRequest) {
    let host = req.header("host").map(str::to_string);
    let proto = "http";
    let port = host
        .as_deref()
        .and_then(|host| host.rsplit_once(':'))
        .map(|(_, port)| port.to_string())
        .filter(|port| port.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or_else(|| "80".to_string());

    if let Some(addr) = req.remote_addr {
        append_value(headers, "x-forwarded-for", &addr.ip().to_string());
    }
    append_value(headers, "x-forwarded-port", &port);
    append_value(headers, "x-forwarded-proto", proto);
    if header_value(headers, "x-forwarded-host").is_none() {
        if let Some(host) = host {
            set_header(headers, "x-forwarded-host", host);
        }
    }
}

/// Folds every existing line of `name` into one comma-separated value before
/// appending, so a chain split across header lines survives.
fn append_value(headers: &mut HeaderList, name: &str, value: &str) {
    let mut parts: Vec<&str> = headers
        .iter()
        .filter(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, existing)| existing.as_str())
        .filter(|existing| !existing.is_empty())
        .collect();
    parts.push(value);
    let combined = parts.join(",");
    set_header(headers, name, combined);
}

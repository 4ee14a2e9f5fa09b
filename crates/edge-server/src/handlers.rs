use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Response};
use axum::routing::get;
use axum::Router;
use rewrite_kernel::{HeaderList, HttpRequest as KernelHttpRequest, ResponseBody, RewritePhase, RewriteTarget};
use tower_http::trace::TraceLayer;
use tracing::debug;

use crate::error::AppError;
use crate::state::AppState;
use crate::static_files::static_response;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/_next/image", get(image_handler))
        .fallback(route_handler)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// `GET /_next/image`
pub async fn image_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    req: Request,
) -> Result<Response<Body>, AppError> {
    let kernel_req = into_kernel_request(req, remote).await?;
    let response = state.kernel.serve_image(&kernel_req).await?;
    kernel_response_to_http(response)
}

/// Everything else: before-files rewrites, embedded assets, after-files and
/// fallback rewrites, then 404.
pub async fn route_handler(
    State(state): State<Arc<AppState>>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    req: Request,
) -> Result<Response<Body>, AppError> {
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    if let Some(target) = state
        .kernel
        .resolve(RewritePhase::BeforeFiles, &path, query.as_deref())
    {
        return proxy(&state, req, remote, target).await;
    }
    if let Some(response) = static_response(req.method(), &path) {
        return Ok(response);
    }
    for phase in [RewritePhase::AfterFiles, RewritePhase::Fallback] {
        if let Some(target) = state.kernel.resolve(phase, &path, query.as_deref()) {
            return proxy(&state, req, remote, target).await;
        }
    }

    debug!(path = %path, "no route matched");
    Err(AppError::not_found(format!("no route for {path}")))
}

async fn proxy(
    state: &AppState,
    req: Request,
    remote: SocketAddr,
    target: RewriteTarget,
) -> Result<Response<Body>, AppError> {
    let kernel_req = into_kernel_request(req, remote).await?;
    let response = state.kernel.proxy(kernel_req, &target).await?;
    kernel_response_to_http(response)
}

async fn into_kernel_request(req: Request, remote: SocketAddr) -> Result<KernelHttpRequest, AppError> {
    let (parts, body) = req.into_parts();
    let body_bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|err| AppError::bad_request(err.to_string()))?;
    Ok(KernelHttpRequest {
        method: parts.method.to_string(),
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: convert_headers(&parts.headers),
        body: body_bytes.to_vec(),
        remote_addr: Some(remote),
    })
}

fn convert_headers(headers: &HeaderMap) -> HeaderList {
    let mut list = Vec::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            list.push((name.as_str().to_lowercase(), value.to_string()));
        }
    }
    list
}

fn kernel_response_to_http(response: rewrite_kernel::HttpResponse) -> Result<Response<Body>, AppError> {
    let mut builder = Response::builder().status(response.status);
    for (key, value) in response.headers {
        if let (Ok(name), Ok(value)) = (
            key.parse::<header::HeaderName>(),
            HeaderValue::from_str(&value),
        ) {
            builder = builder.header(name, value);
        }
    }

    let body = match response.body {
        ResponseBody::Bytes(bytes) => Body::from(bytes),
        ResponseBody::Stream(stream) => Body::from_stream(stream),
    };

    builder
        .body(body)
        .map_err(|err| AppError::internal(err.to_string()))
}

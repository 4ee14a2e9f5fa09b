use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GATEWAY_TIMEOUT, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ErrorBody {
            error: self.status.as_str().to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<edge_config::ConfigError> for AppError {
    fn from(err: edge_config::ConfigError) -> Self {
        AppError::bad_request(err.to_string())
    }
}

impl From<rewrite_kernel::RewriteError> for AppError {
    fn from(err: rewrite_kernel::RewriteError) -> Self {
        AppError::bad_request(err.to_string())
    }
}

impl From<rewrite_kernel::ProxyError> for AppError {
    fn from(err: rewrite_kernel::ProxyError) -> Self {
        use rewrite_kernel::ProxyError;
        match err {
            ProxyError::BadRequest(message) => AppError::bad_request(message),
            ProxyError::Upstream(message) => AppError::bad_gateway(message),
            ProxyError::Timeout(message) => AppError::gateway_timeout(message),
            ProxyError::Internal(message) => AppError::internal(message),
        }
    }
}

impl From<rewrite_kernel::ImageError> for AppError {
    fn from(err: rewrite_kernel::ImageError) -> Self {
        use rewrite_kernel::ImageError;
        match err {
            ImageError::BadRequest(message) => AppError::bad_request(message),
            ImageError::NotFound(message) => AppError::not_found(message),
            ImageError::Upstream { status } => AppError::new(
                StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY),
                "\"url\" parameter is valid but upstream response is invalid",
            ),
            ImageError::Proxy(err) => err.into(),
        }
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.status.as_str(), self.message)
    }
}

impl std::error::Error for AppError {}

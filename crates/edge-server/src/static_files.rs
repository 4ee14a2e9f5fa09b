use axum::body::Body;
use axum::http::{header, HeaderValue, Method, Response, StatusCode};
use include_dir::{include_dir, Dir};

static ASSETS: Dir = include_dir!("$CARGO_MANIFEST_DIR/assets");

/// Returns the embedded asset for `path`, or `None` so routing can continue.
/// Only `GET` and `HEAD` are answered from the bundle.
pub fn static_response(method: &Method, path: &str) -> Option<Response<Body>> {
    if *method != Method::GET && *method != Method::HEAD {
        return None;
    }
    let path = path.trim_start_matches('/');
    let asset_path = if path.is_empty() { "index.html" } else { path };
    let file = ASSETS.get_file(asset_path)?;
    let contents = if *method == Method::HEAD {
        Vec::new()
    } else {
        file.contents().to_vec()
    };
    Some(file_response(contents, file.contents().len(), asset_path))
}

fn file_response(contents: Vec<u8>, len: usize, path: &str) -> Response<Body> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_LENGTH, len);
    if let Some(mime) = mime_guess::from_path(path).first() {
        if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
            builder = builder.header(header::CONTENT_TYPE, value);
        }
    }
    builder
        .body(Body::from(contents))
        .unwrap_or_else(|_| Response::new(Body::from("asset unavailable")))
}

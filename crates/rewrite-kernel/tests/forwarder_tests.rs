use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;

use rewrite_kernel::{
    header_value, Forwarder, HttpForwarder, HttpForwarderConfig, ProxyError, UpstreamRequest,
};

/// Accepts one connection, answers with a canned response and hands the raw
/// request text back through the channel.
fn spawn_server(response: &'static str) -> (String, mpsc::Receiver<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let _ = tx.send(read_request(&mut stream));
            let _ = stream.write_all(response.as_bytes());
        }
    });
    (format!("http://{}", addr), rx)
}

fn read_request(stream: &mut impl Read) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        let n = stream.read(&mut buf).unwrap_or(0);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&data).to_string();
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if data.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&data).to_string()
}

fn forwarder() -> HttpForwarder {
    HttpForwarder::new(HttpForwarderConfig {
        timeout_ms: 2_000,
        user_agent: String::new(),
    })
    .expect("forwarder")
}

#[tokio::test]
async fn http_forwarder_relays_status_headers_and_body() {
    let (url, _rx) = spawn_server(
        "HTTP/1.1 201 Created\r\nContent-Length: 2\r\nX-Backend: mall\r\nConnection: close\r\n\r\nok",
    );
    let req = UpstreamRequest {
        method: "POST".to_string(),
        url,
        headers: Vec::new(),
        body: b"ping".to_vec(),
    };
    let resp = forwarder().send(&req).await.expect("response");
    assert_eq!(resp.status, 201);
    assert_eq!(header_value(&resp.headers, "x-backend"), Some("mall"));
    assert_eq!(header_value(&resp.headers, "connection"), None);
    assert!(resp.body.is_streaming());
    assert_eq!(resp.body.into_bytes_async().await, b"ok");
}

#[tokio::test]
async fn http_forwarder_relays_error_status_body() {
    let (url, _rx) =
        spawn_server("HTTP/1.1 500 Internal Server Error\r\nContent-Length: 4\r\n\r\nfail");
    let req = UpstreamRequest {
        method: "GET".to_string(),
        url,
        headers: Vec::new(),
        body: Vec::new(),
    };
    let resp = forwarder().send(&req).await.expect("response");
    assert_eq!(resp.status, 500);
    assert_eq!(resp.body.into_bytes_async().await, b"fail");
}

#[tokio::test]
async fn http_forwarder_preserves_method_headers_and_body() {
    let (url, rx) = spawn_server("HTTP/1.1 200 OK\r\nContent-Length: 0\r\n\r\n");
    let req = UpstreamRequest {
        method: "PUT".to_string(),
        url: format!("{url}/find-path?x=1"),
        headers: vec![
            ("content-type".to_string(), "application/json".to_string()),
            ("authorization".to_string(), "Bearer abc".to_string()),
            ("host".to_string(), "frontend.local:3000".to_string()),
            ("keep-alive".to_string(), "timeout=5".to_string()),
        ],
        body: br#"{"start":{"x":1,"y":2}}"#.to_vec(),
    };
    let resp = forwarder().send(&req).await.expect("response");
    assert_eq!(resp.status, 200);

    let raw = rx.recv().expect("request").to_lowercase();
    assert!(raw.starts_with("put /find-path?x=1 http/1.1"));
    assert!(raw.contains("content-type: application/json"));
    assert!(raw.contains("authorization: bearer abc"));
    assert!(!raw.contains("frontend.local"));
    assert!(!raw.contains("keep-alive: timeout=5"));
    assert!(raw.contains(r#"{"start":{"x":1,"y":2}}"#));
}

#[tokio::test]
async fn http_forwarder_does_not_follow_redirects() {
    let (url, _rx) = spawn_server(
        "HTTP/1.1 302 Found\r\nLocation: http://127.0.0.1:1/elsewhere\r\nContent-Length: 0\r\n\r\n",
    );
    let req = UpstreamRequest {
        method: "GET".to_string(),
        url,
        headers: Vec::new(),
        body: Vec::new(),
    };
    let resp = forwarder().send(&req).await.expect("response");
    assert_eq!(resp.status, 302);
    assert_eq!(
        header_value(&resp.headers, "location"),
        Some("http://127.0.0.1:1/elsewhere")
    );
}

#[tokio::test]
async fn http_forwarder_reports_unreachable_upstream() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let req = UpstreamRequest {
        method: "GET".to_string(),
        url: format!("http://{addr}/users"),
        headers: Vec::new(),
        body: Vec::new(),
    };
    let err = forwarder().send(&req).await.expect_err("error");
    assert!(matches!(err, ProxyError::Upstream(_)));
}

#[tokio::test]
async fn http_forwarder_times_out_on_silent_upstream() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    thread::spawn(move || {
        if let Ok((stream, _)) = listener.accept() {
            thread::sleep(std::time::Duration::from_millis(1_500));
            drop(stream);
        }
    });
    let forwarder = HttpForwarder::new(HttpForwarderConfig {
        timeout_ms: 200,
        user_agent: String::new(),
    })
    .expect("forwarder");
    let req = UpstreamRequest {
        method: "GET".to_string(),
        url: format!("http://{addr}/slow"),
        headers: Vec::new(),
        body: Vec::new(),
    };
    let err = forwarder.send(&req).await.expect_err("error");
    assert!(matches!(err, ProxyError::Timeout(_)));
}

#[tokio::test]
async fn http_forwarder_rejects_invalid_method() {
    let req = UpstreamRequest {
        method: "BAD METHOD".to_string(),
        url: "http://127.0.0.1:1/".to_string(),
        headers: Vec::new(),
        body: Vec::new(),
    };
    let err = forwarder().send(&req).await.expect_err("error");
    assert!(matches!(err, ProxyError::BadRequest(_)));
}

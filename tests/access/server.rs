//! Server infrastructure integration tests.
//!
//! These tests start a real server, send raw TCP traffic, and assert on
//! observable behavior.

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use super::harness::{boot, config, raw_request};

/// Headers declaring a 10 MB body are rejected before the body is read,
/// and before the guard runs.
#[tokio::test]
async fn server_rejects_oversized_body() {
    let booted = boot(config()).await;

    let response = raw_request(
        booted.addr(),
        b"POST /posts HTTP/1.1\r\nHost: localhost\r\n\
          Content-Length: 10485760\r\nConnection: close\r\n\r\n",
    )
    .await;
    let response_str = String::from_utf8_lossy(&response);

    booted.server.shutdown().await.unwrap();

    assert!(
        response_str.contains("413"),
        "Expected 413 Payload Too Large, got:\n{response_str}"
    );
}

#[tokio::test]
async fn server_returns_security_headers() {
    let booted = boot(config()).await;

    let response = raw_request(
        booted.addr(),
        b"GET /feed HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    let response_lower = String::from_utf8_lossy(&response).to_ascii_lowercase();

    booted.server.shutdown().await.unwrap();

    assert!(
        response_lower.contains("x-content-type-options: nosniff"),
        "Expected X-Content-Type-Options header in response:\n{response_lower}"
    );
    assert!(
        response_lower.contains("x-frame-options: deny"),
        "Expected X-Frame-Options header in response:\n{response_lower}"
    );
}

/// Denials carry the same standard headers as successful responses.
#[tokio::test]
async fn denied_responses_keep_security_headers() {
    let booted = boot(config()).await;

    let response = raw_request(
        booted.addr(),
        b"GET /me HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    let response_lower = String::from_utf8_lossy(&response).to_ascii_lowercase();

    booted.server.shutdown().await.unwrap();

    assert!(response_lower.starts_with("http/1.1 401"), "got:\n{response_lower}");
    assert!(response_lower.contains("x-content-type-options: nosniff"));
}

#[tokio::test]
async fn unknown_paths_and_methods_are_json_errors() {
    let booted = boot(config()).await;

    let missing = raw_request(
        booted.addr(),
        b"GET /nowhere HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    let wrong_method = raw_request(
        booted.addr(),
        b"PATCH /feed HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;

    booted.server.shutdown().await.unwrap();

    let missing = String::from_utf8_lossy(&missing);
    let wrong_method = String::from_utf8_lossy(&wrong_method);
    assert!(missing.starts_with("HTTP/1.1 404"), "got:\n{missing}");
    assert!(missing.contains(r#"{"error":"Not found"}"#));
    assert!(wrong_method.starts_with("HTTP/1.1 405"), "got:\n{wrong_method}");
}

/// A stalled header is dropped once the header read timeout elapses.
#[tokio::test]
async fn server_closes_slow_connections() {
    let booted = boot(config()).await;

    let mut stream = TcpStream::connect(booted.addr())
        .await
        .expect("failed to connect");
    stream
        .write_all(b"GET /feed HTTP/1.1\r\nHost: loc")
        .await
        .expect("failed to write partial request");

    let mut buf = Vec::new();
    let result = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        stream.read_to_end(&mut buf),
    )
    .await;

    booted.server.shutdown().await.unwrap();

    assert!(
        result.is_ok(),
        "Server kept a stalled connection open past the header timeout"
    );
}

#[tokio::test]
async fn server_speaks_http2() {
    let booted = boot(config()).await;

    // HTTP/2 connection preface followed by an empty SETTINGS frame
    let mut preface = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n".to_vec();
    preface.extend_from_slice(&[0, 0, 0, 0x04, 0x00, 0, 0, 0, 0]);

    let mut stream = TcpStream::connect(booted.addr())
        .await
        .expect("failed to connect");
    stream
        .write_all(&preface)
        .await
        .expect("failed to write h2 preface");

    let mut buf = vec![0u8; 256];
    let result =
        tokio::time::timeout(std::time::Duration::from_secs(2), stream.read(&mut buf)).await;

    booted.server.shutdown().await.unwrap();

    match result {
        Ok(Ok(n)) if n >= 9 => assert_eq!(buf[3], 0x04, "Expected HTTP/2 SETTINGS frame"),
        other => panic!("HTTP/2 preface not answered: {other:?}"),
    }
}

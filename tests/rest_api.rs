//! REST API against a fake RESP server

mod common;

use std::sync::Arc;

use clap::Parser;
use common::FakeServer;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use valkey_assess::config::{AssessConfig, CliArgs};
use valkey_assess::server::{router, ServerState};

/// Start the API on an ephemeral port and return its address
async fn start_api(resp_port: u16) -> String {
    let port = resp_port.to_string();
    let args = CliArgs::parse_from([
        "valkey-assess",
        "-p",
        port.as_str(),
        "--retries",
        "1",
        "--serve",
        "127.0.0.1:0",
        "-q",
    ]);
    let config = AssessConfig::from_cli(&args).unwrap();
    let app = router(Arc::new(ServerState::new(config)));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// Minimal HTTP/1.1 client: returns status code and parsed JSON body
async fn request(addr: &str, method: &str, path: &str, body: Option<&str>) -> (u16, Value) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let body = body.unwrap_or("");
    let req = format!(
        "{method} {path} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\
         Content-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(req.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).await.unwrap();
    let text = String::from_utf8(raw).unwrap();

    let status: u16 = text
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap();
    let (_, payload) = text.split_once("\r\n\r\n").unwrap();
    let json = if payload.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(payload).unwrap_or(Value::Null)
    };
    (status, json)
}

#[tokio::test]
async fn test_health_and_topology() {
    let fake = FakeServer::start(&[]);
    let api = start_api(fake.port).await;

    let (status, body) = request(&api, "GET", "/health", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["seed"], fake.address());

    let (status, body) = request(&api, "GET", "/topology", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["mode"], "standalone");
    assert_eq!(body["primaries"], 1);
}

#[tokio::test]
async fn test_metrics_and_commandstats() {
    let fake = FakeServer::start(&[]);
    let api = start_api(fake.port).await;

    let (status, body) = request(&api, "GET", "/metrics", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["nodes"][0]["values"]["connected_clients"], 5);
    assert_eq!(body["nodes"][0]["keys"], 3);

    let (status, body) = request(&api, "GET", "/commandstats", None).await;
    assert_eq!(status, 200);
    assert!(body["nodes"][0]["commands"]["get"]["calls"].as_u64().unwrap() > 0);
}

#[tokio::test]
async fn test_command_allowlist() {
    let fake = FakeServer::start(&[]);
    let api = start_api(fake.port).await;

    let (status, body) = request(&api, "POST", "/command", Some(r#"{"args":["PING"]}"#)).await;
    assert_eq!(status, 200);
    assert_eq!(body["reply"], "PONG");

    let (status, body) =
        request(&api, "POST", "/command", Some(r#"{"args":["FLUSHALL"]}"#)).await;
    assert_eq!(status, 403);
    assert!(body["error"].as_str().unwrap().contains("FLUSHALL"));

    let (status, _) = request(
        &api,
        "POST",
        "/command",
        Some(r#"{"node":"10.9.9.9:6379","args":["PING"]}"#),
    )
    .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_delta_duration_validation() {
    let fake = FakeServer::start(&[]);
    let api = start_api(fake.port).await;

    let (status, _) = request(&api, "GET", "/delta?duration=0", None).await;
    assert_eq!(status, 400);
    let (status, _) = request(&api, "GET", "/delta?duration=301", None).await;
    assert_eq!(status, 400);

    let (status, body) = request(&api, "GET", "/delta?duration=1", None).await;
    assert_eq!(status, 200);
    assert_eq!(body["nodes"][0]["net_input_bytes"], 10240);
}

//! HTTP API over a real socket

use roadlife::domain::{GeoPoint, ReferenceLine};
use roadlife::infra::Metrics;
use roadlife::io::http::serve;
use roadlife::io::{ApiState, PostcodeTable, ReportEgress, RoadCatalog};
use roadlife::services::{DistanceSettings, ProximityEngine};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

struct TestServer {
    addr: SocketAddr,
    shutdown: watch::Sender<bool>,
    handle: tokio::task::JoinHandle<()>,
}

async fn start(egress_file: Option<&str>) -> TestServer {
    let mut table = PostcodeTable::new();
    table.insert("SW1A 1AA", GeoPoint::new(51.501009, -0.141588));
    let mut catalog = RoadCatalog::new();
    catalog.insert(
        "The_Mall",
        ReferenceLine::new("The Mall", vec![GeoPoint::new(51.5045, -0.1340), GeoPoint::new(51.5025, -0.1395)]),
    );
    let metrics = Arc::new(Metrics::new());
    let engine = Arc::new(ProximityEngine::new(
        Arc::new(table),
        Arc::new(catalog),
        DistanceSettings::default(),
        metrics.clone(),
    ));
    let mut state = ApiState::new(engine, metrics, "it", 512);
    if let Some(file) = egress_file {
        state = state.with_egress(ReportEgress::new(file));
    }

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        serve(listener, Arc::new(state), shutdown_rx).await.unwrap();
    });
    TestServer { addr, shutdown, handle }
}

/// Send one HTTP/1.1 request and return (status, body)
async fn request(addr: SocketAddr, method: &str, path: &str, body: &str) -> (u16, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let raw = format!(
        "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(raw.as_bytes()).await.unwrap();

    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    let status = response.split_whitespace().nth(1).unwrap().parse().unwrap();
    let body = response.split_once("\r\n\r\n").map(|(_, b)| b.to_string()).unwrap_or_default();
    (status, body)
}

#[tokio::test]
async fn test_roads_and_health() {
    let server = start(None).await;

    let (status, body) = request(server.addr, "GET", "/health", "").await;
    assert_eq!((status, body.as_str()), (200, "ok"));

    let (status, body) = request(server.addr, "GET", "/roads", "").await;
    assert_eq!(status, 200);
    assert_eq!(body, r#"[{"id":"The_Mall","name":"The Mall"}]"#);

    server.shutdown.send(true).unwrap();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn test_proximity_run_and_metrics() {
    let dir = tempfile::tempdir().unwrap();
    let egress_file = dir.path().join("reports.jsonl");
    let server = start(egress_file.to_str()).await;

    let body = r#"{"road":"The_Mall","entries":[{"postcode":"sw1a1aa","from":"2019-05-01"}],"today":"2019-06-01"}"#;
    let (status, body) = request(server.addr, "POST", "/proximity", body).await;
    assert_eq!(status, 200);
    let report: serde_json::Value = serde_json::from_str(&body).unwrap();
    assert_eq!(report["feature"], "The Mall");
    assert_eq!(report["daily"].as_array().unwrap().len(), 32);
    let mean = report["stats"]["mean_m"].as_f64().unwrap();
    assert!(mean > 0.0 && mean < 1_000.0);

    let egressed = std::fs::read_to_string(&egress_file).unwrap();
    assert_eq!(egressed.lines().count(), 1);

    let (status, body) = request(server.addr, "GET", "/metrics", "").await;
    assert_eq!(status, 200);
    assert!(body.contains("roadlife_runs_total{site=\"it\"} 1"));

    server.shutdown.send(true).unwrap();
    server.handle.await.unwrap();
}

#[tokio::test]
async fn test_error_statuses() {
    let server = start(None).await;

    let unknown = r#"{"road":"A1","entries":[{"postcode":"SW1A1AA","from":"2019-05-01"}]}"#;
    let (status, body) = request(server.addr, "POST", "/proximity", unknown).await;
    assert_eq!(status, 404);
    assert!(body.contains(r#""ok":false"#));

    let future = r#"{"road":"The_Mall","entries":[{"postcode":"SW1A1AA","from":"2019-05-01"}],"today":"2019-01-01"}"#;
    let (status, body) = request(server.addr, "POST", "/proximity", future).await;
    assert_eq!(status, 422);
    assert!(body.contains("invalid_timeline"));

    let (status, _) = request(server.addr, "POST", "/proximity", &"x".repeat(600)).await;
    assert_eq!(status, 413);

    let (status, _) = request(server.addr, "POST", "/proximity", r#"{"road":1}"#).await;
    assert_eq!(status, 400);

    server.shutdown.send(true).unwrap();
    server.handle.await.unwrap();
}

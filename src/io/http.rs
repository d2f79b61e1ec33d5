//! HTTP API - roads listing, proximity runs, health and metrics
//!
//! Routes:
//! - `GET /health` - liveness probe
//! - `GET /roads` - selectable reference lines
//! - `POST /proximity` - run one residence timeline against a road
//! - `GET /metrics` - Prometheus text format
//!
//! Uses hyper http1 with one task per connection; the accept loop exits when
//! the shutdown channel flips to true.

use crate::domain::{ProximityError, ResidenceEntry};
use crate::infra::metrics::Metrics;
use crate::io::egress::ReportEgress;
use crate::io::prometheus::format_prometheus_metrics;
use crate::services::engine::ProximityEngine;
use bytes::Bytes;
use chrono::NaiveDate;
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Body;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::error::Error;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, error, info};

type BoxError = Box<dyn Error + Send + Sync>;

/// Shared state for every connection
pub struct ApiState {
    engine: Arc<ProximityEngine>,
    metrics: Arc<Metrics>,
    egress: Option<ReportEgress>,
    site_id: String,
    max_body_bytes: usize,
}

impl ApiState {
    pub fn new(
        engine: Arc<ProximityEngine>,
        metrics: Arc<Metrics>,
        site_id: &str,
        max_body_bytes: usize,
    ) -> Self {
        Self { engine, metrics, egress: None, site_id: site_id.to_string(), max_body_bytes }
    }

    pub fn with_egress(mut self, egress: ReportEgress) -> Self {
        self.egress = Some(egress);
        self
    }
}

/// Body of `POST /proximity`
#[derive(Debug, Deserialize)]
struct ProximityRequest {
    road: String,
    entries: Vec<ResidenceEntry>,
    /// Defaults to the server's local date
    #[serde(default)]
    today: Option<NaiveDate>,
}

/// HTTP status for a failed run
fn error_status(err: &ProximityError) -> StatusCode {
    match err {
        ProximityError::ReferenceLineNotFound(_) => StatusCode::NOT_FOUND,
        ProximityError::EmptyReferenceLine(_) => StatusCode::INTERNAL_SERVER_ERROR,
        ProximityError::InvalidTimeline(_)
        | ProximityError::UnresolvedLocation(_)
        | ProximityError::InvalidCoordinate { .. }
        | ProximityError::ZeroDuration
        | ProximityError::NoResolvedLocations { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn json_response(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("Access-Control-Allow-Origin", "*")
        .body(Full::new(Bytes::from(body)))
        .expect("static response should not fail")
}

fn error_response(status: StatusCode, kind: &str, message: &str) -> Response<Full<Bytes>> {
    let body = json!({ "ok": false, "error": kind, "message": message });
    json_response(status, body.to_string())
}

/// Collect the request body, enforcing the size limit
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, Response<Full<Bytes>>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => Err(error_response(
            StatusCode::PAYLOAD_TOO_LARGE,
            "body_too_large",
            &format!("request body exceeds {limit} bytes"),
        )),
        Err(e) => Err(error_response(StatusCode::BAD_REQUEST, "unreadable_body", &e.to_string())),
    }
}

async fn handle_proximity<B>(body: B, state: &ApiState) -> Response<Full<Bytes>>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    let bytes = match read_body(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(response) => return response,
    };
    let request: ProximityRequest = match serde_json::from_slice(&bytes) {
        Ok(request) => request,
        Err(e) => {
            return error_response(StatusCode::BAD_REQUEST, "invalid_request", &e.to_string());
        }
    };

    let today = request.today.unwrap_or_else(|| chrono::Local::now().date_naive());

    // Distance scans are CPU bound; keep them off the reactor threads
    let engine = Arc::clone(&state.engine);
    let run =
        tokio::task::spawn_blocking(move || engine.run(&request.road, &request.entries, today));
    let result = match run.await {
        Ok(result) => result,
        Err(e) => {
            error!(error = %e, "proximity_task_failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "proximity run did not complete",
            );
        }
    };

    match result {
        Ok(report) => {
            if let Some(egress) = &state.egress {
                egress.write_report(&report);
            }
            json_response(StatusCode::OK, report.to_json())
        }
        Err(e) => error_response(error_status(&e), e.kind(), &e.to_string()),
    }
}

/// Handle HTTP requests
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<ApiState>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body<Data = Bytes>,
    B::Error: Into<BoxError>,
{
    debug!(method = %req.method(), path = %req.uri().path(), "http_request");

    let response = match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => Response::builder()
            .status(StatusCode::OK)
            .body(Full::new(Bytes::from("ok")))
            .expect("static response should not fail"),
        (&Method::GET, "/roads") => {
            let body = serde_json::to_string(&state.engine.features())
                .unwrap_or_else(|_| "[]".to_string());
            json_response(StatusCode::OK, body)
        }
        (&Method::POST, "/proximity") => handle_proximity(req.into_body(), &state).await,
        (&Method::OPTIONS, "/proximity") => Response::builder()
            .status(StatusCode::OK)
            .header("Access-Control-Allow-Origin", "*")
            .header("Access-Control-Allow-Methods", "POST, OPTIONS")
            .header("Access-Control-Allow-Headers", "Content-Type")
            .body(Full::new(Bytes::from("")))
            .expect("static response should not fail"),
        (&Method::GET, "/metrics") => {
            let body = format_prometheus_metrics(&state.metrics, &state.site_id);
            Response::builder()
                .status(StatusCode::OK)
                .header("Content-Type", "text/plain; version=0.0.4; charset=utf-8")
                .body(Full::new(Bytes::from(body)))
                .expect("static response should not fail")
        }
        _ => Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("Not Found")))
            .expect("static response should not fail"),
    };
    Ok(response)
}

/// Bind `bind_address:port` and serve until shutdown
pub async fn start_api_server(
    bind_address: &str,
    port: u16,
    state: Arc<ApiState>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), BoxError> {
    let listener = TcpListener::bind((bind_address, port)).await?;
    serve(listener, state, shutdown).await
}

/// Serve connections from an already bound listener until shutdown
pub async fn serve(
    listener: TcpListener,
    state: Arc<ApiState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), BoxError> {
    let addr = listener.local_addr()?;
    info!(addr = %addr, site = %state.site_id, "api_server_started");

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        let io = TokioIo::new(stream);
                        let state = state.clone();

                        tokio::spawn(async move {
                            let service = service_fn(move |req| {
                                let state = state.clone();
                                async move { handle_request(req, state).await }
                            });

                            if let Err(e) = http1::Builder::new()
                                .serve_connection(io, service)
                                .await
                            {
                                error!(error = %e, "api_http_error");
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "api_accept_error");
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("api_server_shutdown");
                    return Ok(());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{GeoPoint, ReferenceLine};
    use crate::io::postcodes::PostcodeTable;
    use crate::io::roads::RoadCatalog;
    use crate::services::geodesic::DistanceSettings;
    use crate::services::resolver::LocationLookup;
    use std::time::{Duration, Instant};

    fn state(max_body_bytes: usize) -> Arc<ApiState> {
        let mut table = PostcodeTable::new();
        table.insert("AB1", GeoPoint::new(0.01, 0.0));
        let mut catalog = RoadCatalog::new();
        catalog.insert("Equator", ReferenceLine::new("Equator", vec![GeoPoint::new(0.0, 0.0)]));
        catalog.insert("Empty", ReferenceLine::new("Empty", vec![]));
        let metrics = Arc::new(Metrics::new());
        let engine = Arc::new(ProximityEngine::new(
            Arc::new(table),
            Arc::new(catalog),
            DistanceSettings::default(),
            metrics.clone(),
        ));
        Arc::new(ApiState::new(engine, metrics, "test", max_body_bytes))
    }

    async fn call(state: Arc<ApiState>, method: Method, path: &str, body: &str) -> (StatusCode, String) {
        let req = Request::builder()
            .method(method)
            .uri(path)
            .body(Full::new(Bytes::from(body.to_string())))
            .unwrap();
        let response = handle_request(req, state).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[test]
    fn test_error_status_mapping() {
        assert_eq!(
            error_status(&ProximityError::ReferenceLineNotFound("X".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            error_status(&ProximityError::EmptyReferenceLine("X".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(error_status(&ProximityError::ZeroDuration), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            error_status(&ProximityError::InvalidTimeline("dup".into())),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[tokio::test]
    async fn test_health_and_roads() {
        let (status, body) = call(state(1024), Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");

        let (status, body) = call(state(1024), Method::GET, "/roads", "").await;
        assert_eq!(status, StatusCode::OK);
        let roads: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(roads[0]["id"], "Empty");
        assert_eq!(roads[1]["id"], "Equator");
    }

    #[tokio::test]
    async fn test_proximity_ok() {
        let body = r#"{"road":"Equator","entries":[{"postcode":"ab 1","from":"2021-01-01"}],"today":"2021-01-11"}"#;
        let (status, body) = call(state(1024), Method::POST, "/proximity", body).await;
        assert_eq!(status, StatusCode::OK);
        let report: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(report["daily"].as_array().unwrap().len(), 11);
        assert_eq!(report["today"], "2021-01-11");
    }

    #[tokio::test]
    async fn test_proximity_errors() {
        let state = state(1024);
        let unknown = r#"{"road":"M6","entries":[{"postcode":"AB1","from":"2021-01-01"}],"today":"2021-01-11"}"#;
        let (status, body) = call(state.clone(), Method::POST, "/proximity", unknown).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("reference_line_not_found"));

        let empty = r#"{"road":"Empty","entries":[{"postcode":"AB1","from":"2021-01-01"}],"today":"2021-01-11"}"#;
        let (status, _) = call(state.clone(), Method::POST, "/proximity", empty).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

        let unresolved = r#"{"road":"Equator","entries":[{"postcode":"ZZ9","from":"2021-01-01"}],"today":"2021-01-11"}"#;
        let (status, body) = call(state.clone(), Method::POST, "/proximity", unresolved).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body.contains("no_resolved_locations"));

        let (status, body) = call(state.clone(), Method::POST, "/proximity", "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body.contains("invalid_request"));

        assert_eq!(state.metrics.runs_failed_total(), 3);
    }

    struct SlowLookup(Duration);

    impl LocationLookup for SlowLookup {
        fn lookup(&self, _normalized_key: &str) -> Option<GeoPoint> {
            std::thread::sleep(self.0);
            Some(GeoPoint::new(0.01, 0.0))
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_slow_run_does_not_block_other_requests() {
        let mut catalog = RoadCatalog::new();
        catalog.insert("Equator", ReferenceLine::new("Equator", vec![GeoPoint::new(0.0, 0.0)]));
        let metrics = Arc::new(Metrics::new());
        let engine = Arc::new(ProximityEngine::new(
            Arc::new(SlowLookup(Duration::from_millis(400))),
            Arc::new(catalog),
            DistanceSettings::default(),
            metrics.clone(),
        ));
        let state = Arc::new(ApiState::new(engine, metrics, "test", 1024));

        let body = r#"{"road":"Equator","entries":[{"postcode":"AB1","from":"2021-01-01"}],"today":"2021-01-11"}"#;
        let started = Instant::now();
        let run = tokio::spawn(call(state.clone(), Method::POST, "/proximity", body));
        tokio::task::yield_now().await;

        let (status, _) = call(state.clone(), Method::GET, "/health", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(started.elapsed() < Duration::from_millis(300));

        let (status, _) = run.await.unwrap();
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_body_limit() {
        let big = format!(r#"{{"road":"Equator","pad":"{}"}}"#, "x".repeat(200));
        let (status, body) = call(state(64), Method::POST, "/proximity", &big).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(body.contains("body_too_large"));
    }

    #[tokio::test]
    async fn test_metrics_and_not_found() {
        let (status, body) = call(state(1024), Method::GET, "/metrics", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("roadlife_runs_total{site=\"test\"} 0"));

        let (status, _) = call(state(1024), Method::GET, "/nope", "").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

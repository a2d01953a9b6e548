//! HTTP server module.
//!
//! Serves the Prometheus exposition and the liveness/readiness endpoints.

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinError;
use tower_http::trace::{DefaultMakeSpan, TraceLayer};

use crate::device::DeviceEntry;
use crate::exposition::Exposition;

/// Content type of the Prometheus text format.
pub const METRICS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub exposition: Arc<Exposition>,
    pub devices: Vec<Arc<DeviceEntry>>,
}

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    devices: Option<Vec<DeviceStatus>>,
}

#[derive(Serialize)]
struct DeviceStatus {
    name: String,
    address: String,
    connected: bool,
    successive_failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    backoff_secs: Option<u64>,
}

/// Create the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    let app_state = Arc::new(state);

    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .layer(TraceLayer::new_for_http().make_span_with(DefaultMakeSpan::default()))
        .with_state(app_state)
}

/// Serve `app` on `listener` until `signal` resolves.
///
/// `stop` is flipped before the listener starts draining, so the scheduler
/// discards its pending jobs while requests still finish. Draining is cut off
/// after `drain_timeout`.
pub async fn serve_until<F>(
    listener: TcpListener,
    app: Router,
    signal: F,
    stop: watch::Sender<bool>,
    drain_timeout: Duration,
) -> std::io::Result<()>
where
    F: Future<Output = ()>,
{
    let mut stopped = stop.subscribe();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stopped.wait_for(|stopped| *stopped).await;
            })
            .await
    });

    tokio::select! {
        result = &mut server => return joined(result),
        () = signal => {}
    }

    tracing::info!("Stopping scheduler and draining connections...");
    let _ = stop.send(true);

    match tokio::time::timeout(drain_timeout, &mut server).await {
        Ok(result) => joined(result),
        Err(_) => {
            tracing::warn!(
                timeout_ms = drain_timeout.as_millis() as u64,
                "Connections did not drain in time, closing them"
            );
            server.abort();
            Ok(())
        }
    }
}

fn joined(result: Result<std::io::Result<()>, JoinError>) -> std::io::Result<()> {
    result.map_err(std::io::Error::other)?
}

/// Prometheus scrape endpoint.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.exposition.render() {
        Ok(body) => ([(header::CONTENT_TYPE, METRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "Failed to render metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("Error: {}", e)).into_response()
        }
    }
}

/// Liveness endpoint.
async fn healthz_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        devices: None,
    })
}

/// Readiness endpoint listing each device's last known connection state.
///
/// Reports `degraded` while any device is disconnected; the exporter keeps
/// serving either way. Devices that failed to connect also report the
/// current backoff window.
async fn readyz_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let devices: Vec<DeviceStatus> = state
        .devices
        .iter()
        .map(|device| {
            let connection = device.connection().state();
            DeviceStatus {
                name: device.identity().device_name.clone(),
                address: device.identity().address.clone(),
                connected: connection.connected,
                successive_failures: connection.successive_failure_count,
                backoff_secs: (connection.successive_failure_count > 0)
                    .then(|| device.connection().current_delay().as_secs()),
            }
        })
        .collect();

    let status = if devices.iter().all(|d| d.connected) {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: status.to_string(),
        devices: Some(devices),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::{Collector, CollectorError, catalog};
    use crate::device::mock::{MockTransport, connected_entry, test_entry};
    use crate::scheduler::{Job, LoadStats, Scheduler};
    use crate::store::MetricSeries;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;
    use tower::ServiceExt;

    #[derive(Default)]
    struct CountingCollector {
        loads: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Collector for CountingCollector {
        fn name(&self) -> &str {
            "counting"
        }

        async fn load(&self, _: Option<&DeviceEntry>) -> Result<(), CollectorError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn collect(&self) -> Vec<MetricSeries> {
            Vec::new()
        }
    }

    fn empty_state() -> AppState {
        AppState {
            exposition: Arc::new(Exposition::new("mtik_exporter")),
            devices: Vec::new(),
        }
    }

    async fn request(app: Router, uri: &str) -> (StatusCode, Option<String>, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, content_type, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_healthz() {
        let (status, _, body) = request(create_router(empty_state()), "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_readyz_reports_devices() {
        let up = MockTransport::new();
        let down = MockTransport::new();
        let refused = MockTransport::new();
        refused.set_handshake_ok(false);
        let failing = test_entry(refused);
        failing.connection().connect().await;
        let state = AppState {
            exposition: Arc::new(Exposition::new("mtik_exporter")),
            devices: vec![
                Arc::new(connected_entry(up).await),
                Arc::new(test_entry(down)),
                Arc::new(failing),
            ],
        };

        let (status, _, body) = request(create_router(state), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(body["status"], "degraded");
        assert_eq!(body["devices"][0]["connected"], true);
        assert_eq!(body["devices"][1]["connected"], false);
        assert_eq!(body["devices"][1]["address"], "10.0.0.1");
        assert!(body["devices"][1].get("backoff_secs").is_none());
        // 120s * (1 + 1/5)
        assert_eq!(body["devices"][2]["successive_failures"], 1);
        assert_eq!(body["devices"][2]["backoff_secs"], 144);
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let transport = MockTransport::new();
        transport.set_records(
            "system/identity",
            vec![json!({"name": "core-router"})],
        );
        let entry = Arc::new(connected_entry(transport).await);

        let identity = catalog::build(
            "identity",
            entry.identity().labels(),
            Duration::from_secs(60),
        )
        .unwrap();
        identity.load(Some(entry.as_ref())).await.unwrap();

        let exposition = Exposition::new("mtik_exporter").with_collectors([identity]);
        let state = AppState {
            exposition: Arc::new(exposition),
            devices: vec![entry],
        };

        let (status, content_type, body) = request(create_router(state), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some(METRICS_CONTENT_TYPE));
        assert!(body.contains("mtik_exporter_system_identity_info"));
        assert!(body.contains(r#"name="core-router""#));
        assert!(body.contains(r#"device_name="r1""#));
    }

    #[tokio::test]
    async fn test_stop_reaches_scheduler_before_due_job() {
        let counting = Arc::new(CountingCollector::default());
        let stats = Arc::new(LoadStats::new("test").unwrap());
        let mut scheduler = Scheduler::new(stats).with_stagger(Duration::from_millis(300));
        scheduler.add_job(Job::system(Vec::new(), Duration::from_secs(60)));
        scheduler.add_job(Job::system(
            vec![Arc::clone(&counting) as Arc<dyn Collector>],
            Duration::from_secs(60),
        ));
        let (stop, stop_rx) = watch::channel(false);
        let scheduler = tokio::spawn(scheduler.run(stop_rx));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let (signal_tx, signal_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve_until(
            listener,
            create_router(empty_state()),
            async move {
                let _ = signal_rx.await;
            },
            stop,
            Duration::from_secs(1),
        ));

        signal_tx.send(()).unwrap();
        server.await.unwrap().unwrap();
        tokio::time::timeout(Duration::from_secs(1), scheduler)
            .await
            .unwrap()
            .unwrap();

        // Past the second job's first fire time
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(counting.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_drain_is_bounded() {
        let app = Router::new().route(
            "/slow",
            get(|| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                "late"
            }),
        );
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop, stop_rx) = watch::channel(false);
        let (signal_tx, signal_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(serve_until(
            listener,
            app,
            async move {
                let _ = signal_rx.await;
            },
            stop,
            Duration::from_millis(300),
        ));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"GET /slow HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let started = std::time::Instant::now();
        signal_tx.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Scheduler is told to stop while the request is still in flight
        assert!(*stop_rx.borrow());
        assert!(!server.is_finished());

        server.await.unwrap().unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}

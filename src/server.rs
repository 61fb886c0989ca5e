//! HTTP and WebSocket surface
//!
//! Routes:
//! - GET  /ws/vitals: telemetry stream, one JSON text frame per tick
//! - POST /intervention/stabilize, /emergency/code-blue, /system/recalibrate
//! - GET  /system/mode, /telemetry/history
//! - GET  /digital-twin/predict, POST /neural-sync/stability
//! - POST /ask-ai, /analyze-scan
//! - GET  /auth-logs, POST /auth/scrub-in
//! - GET  /health

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::{SinkExt, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::MonitorError;
use crate::forecast::{StabilityScore, TwinForecast};
use crate::monitor::{HealthReport, Monitor, ScanAnalysis};
use crate::types::{AccessLogEntry, OperatingMode, ReportedVitals};

/// Largest accepted scan upload
pub const MAX_SCAN_BYTES: usize = 20 * 1024 * 1024;

// ---------------------------------------------------------------------------
// API types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
pub struct StabilizeResponse {
    pub status: String,
    pub target: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CodeBlueResponse {
    pub status: String,
    pub system_alert: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RecalibrateResponse {
    pub status: String,
    pub system_alert: bool,
    pub intervention_active: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModeResponse {
    pub alert_active: bool,
    pub stabilizing: bool,
    pub mode: OperatingMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub heart_rates: Vec<i32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct VitalsRequest {
    #[serde(default)]
    pub vitals: ReportedVitals,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub report: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LogsResponse {
    pub logs: Vec<AccessLogEntry>,
}

#[derive(Debug, Deserialize)]
pub struct ScrubInRequest {
    #[serde(default)]
    pub neural_sig: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScrubInResponse {
    pub auth: String,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}

impl IntoResponse for MonitorError {
    fn into_response(self) -> Response {
        let status = match &self {
            MonitorError::Validation(_) | MonitorError::JsonError(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            MonitorError::BiometricMismatch => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (
            status,
            Json(ErrorBody {
                detail: self.to_string(),
            }),
        )
            .into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET /ws/vitals
async fn vitals_ws(ws: WebSocketUpgrade, State(monitor): State<Arc<Monitor>>) -> Response {
    ws.on_upgrade(move |socket| stream_vitals(socket, monitor))
}

/// Drive one connection's telemetry until the client leaves or a send fails
async fn stream_vitals(socket: WebSocket, monitor: Arc<Monitor>) {
    let _guard = monitor.open_stream();
    let (mut sender, mut receiver) = socket.split();

    let samples = monitor.subscribe(StdRng::from_entropy());
    futures::pin_mut!(samples);

    loop {
        tokio::select! {
            sample = samples.next() => {
                let Some(sample) = sample else { break };
                let frame = match serde_json::to_string(&sample) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(error = %e, "failed to encode telemetry frame");
                        break;
                    }
                };
                if let Err(e) = sender.send(Message::Text(frame)).await {
                    debug!(error = %e, "telemetry send failed, closing stream");
                    break;
                }
            }
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }
}

/// POST /intervention/stabilize
async fn stabilize_handler(State(monitor): State<Arc<Monitor>>) -> Json<StabilizeResponse> {
    monitor.set_stabilize();
    Json(StabilizeResponse {
        status: "Automated Infusion Active".to_string(),
        target: format!("{} BPM", monitor.target()),
    })
}

/// POST /emergency/code-blue
async fn code_blue_handler(State(monitor): State<Arc<Monitor>>) -> Json<CodeBlueResponse> {
    monitor.set_code_blue();
    Json(CodeBlueResponse {
        status: "CODE BLUE ACTIVATED".to_string(),
        system_alert: true,
    })
}

/// POST /system/recalibrate
async fn recalibrate_handler(State(monitor): State<Arc<Monitor>>) -> Json<RecalibrateResponse> {
    monitor.recalibrate();
    let mode = monitor.mode();
    Json(RecalibrateResponse {
        status: "Systems Recalibrated".to_string(),
        system_alert: mode.alert_active,
        intervention_active: mode.stabilizing,
    })
}

/// GET /system/mode
async fn mode_handler(State(monitor): State<Arc<Monitor>>) -> Json<ModeResponse> {
    let snapshot = monitor.mode();
    Json(ModeResponse {
        alert_active: snapshot.alert_active,
        stabilizing: snapshot.stabilizing,
        mode: snapshot.mode(),
    })
}

/// GET /telemetry/history
async fn history_handler(State(monitor): State<Arc<Monitor>>) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        heart_rates: monitor.history(),
    })
}

/// GET /digital-twin/predict
async fn predict_handler(State(monitor): State<Arc<Monitor>>) -> Json<TwinForecast> {
    Json(monitor.forecast(&mut rand::thread_rng()))
}

/// POST /neural-sync/stability
async fn stability_handler(
    State(monitor): State<Arc<Monitor>>,
    Json(request): Json<VitalsRequest>,
) -> Json<StabilityScore> {
    Json(monitor.stability(&request.vitals))
}

/// POST /ask-ai
async fn ask_ai_handler(
    State(monitor): State<Arc<Monitor>>,
    Json(request): Json<VitalsRequest>,
) -> Json<AskResponse> {
    let report = monitor
        .consult(&request.vitals, request.query.as_deref())
        .await;
    Json(AskResponse { report })
}

/// POST /analyze-scan
async fn analyze_scan_handler(
    State(monitor): State<Arc<Monitor>>,
    multipart: Multipart,
) -> Json<ScanAnalysis> {
    match read_scan(multipart).await {
        Ok((bytes, mime_type)) => Json(monitor.analyze_scan(&bytes, &mime_type).await),
        Err(e) => {
            warn!(error = %e, "scan upload rejected");
            Json(ScanAnalysis::failed(&e))
        }
    }
}

/// Pull the `file` field out of a multipart upload
async fn read_scan(mut multipart: Multipart) -> Result<(Vec<u8>, String), MonitorError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| MonitorError::Validation(e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let mime_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| MonitorError::Validation(e.to_string()))?;
        return Ok((bytes.to_vec(), mime_type));
    }
    Err(MonitorError::Validation("missing 'file' field".to_string()))
}

/// GET /auth-logs
async fn auth_logs_handler(State(monitor): State<Arc<Monitor>>) -> Json<LogsResponse> {
    Json(LogsResponse {
        logs: monitor.access_logs(),
    })
}

/// POST /auth/scrub-in
async fn scrub_in_handler(
    State(monitor): State<Arc<Monitor>>,
    Json(request): Json<ScrubInRequest>,
) -> Result<Json<ScrubInResponse>, MonitorError> {
    monitor.scrub_in(request.neural_sig.as_deref())?;
    Ok(Json(ScrubInResponse {
        auth: "SUCCESS".to_string(),
        message: "Neural link scrubbed in.".to_string(),
    }))
}

/// GET /health
async fn health_handler(State(monitor): State<Arc<Monitor>>) -> Json<HealthReport> {
    Json(monitor.health())
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Build the router over a shared monitor
pub fn router(monitor: Arc<Monitor>) -> Router {
    Router::new()
        .route("/ws/vitals", get(vitals_ws))
        .route("/intervention/stabilize", post(stabilize_handler))
        .route("/emergency/code-blue", post(code_blue_handler))
        .route("/system/recalibrate", post(recalibrate_handler))
        .route("/system/mode", get(mode_handler))
        .route("/telemetry/history", get(history_handler))
        .route("/digital-twin/predict", get(predict_handler))
        .route("/neural-sync/stability", post(stability_handler))
        .route("/ask-ai", post(ask_ai_handler))
        .route(
            "/analyze-scan",
            post(analyze_scan_handler).layer(DefaultBodyLimit::max(MAX_SCAN_BYTES)),
        )
        .route("/auth-logs", get(auth_logs_handler))
        .route("/auth/scrub-in", post(scrub_in_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .with_state(monitor)
}

/// Start the server and run until Ctrl-C
pub async fn run_server(config: MonitorConfig) -> Result<(), MonitorError> {
    let bind_addr = config.bind_addr;
    let monitor = Arc::new(Monitor::from_config(config)?);
    let health = monitor.health();

    let app = router(Arc::clone(&monitor));
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;

    info!(
        %bind_addr,
        instance_id = %health.instance_id,
        advisor = %health.advisor,
        "ICU monitor listening"
    );
    info!("  Vitals: ws://{bind_addr}/ws/vitals");
    info!("  Health: http://{bind_addr}/health");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("ICU monitor stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisor::testing::ScriptedAdvisor;
    use crate::advisor::OfflineAdvisor;
    use axum::body::Body;
    use axum::http::{header, Method, Request};
    use pretty_assertions::assert_eq;
    use serde_json::Value;
    use crate::telemetry::{ALERT_HR_RANGE, NORMAL_HR_RANGE};
    use crate::types::TelemetrySample;
    use std::time::Duration;
    use tokio_tungstenite::connect_async;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tower::ServiceExt;

    fn app_with(monitor: Arc<Monitor>) -> Router {
        router(monitor)
    }

    fn offline() -> Arc<Monitor> {
        Arc::new(Monitor::new(MonitorConfig::default(), Arc::new(OfflineAdvisor)))
    }

    async fn call(app: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn test_control_routes() {
        let monitor = offline();

        let (status, body) =
            call(app_with(monitor.clone()), Method::POST, "/intervention/stabilize", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "Automated Infusion Active");
        assert_eq!(body["target"], "75 BPM");
        assert!(monitor.mode().stabilizing);

        let (_, body) =
            call(app_with(monitor.clone()), Method::POST, "/emergency/code-blue", None).await;
        assert_eq!(body["status"], "CODE BLUE ACTIVATED");
        assert_eq!(body["system_alert"], true);

        let (_, body) = call(app_with(monitor.clone()), Method::GET, "/system/mode", None).await;
        assert_eq!(body["alert_active"], true);
        assert_eq!(body["stabilizing"], false);
        assert_eq!(body["mode"], "alert");

        let (_, body) =
            call(app_with(monitor.clone()), Method::POST, "/system/recalibrate", None).await;
        assert_eq!(body["system_alert"], false);
        assert_eq!(body["intervention_active"], false);

        let (_, body) =
            call(app_with(monitor.clone()), Method::GET, "/telemetry/history", None).await;
        assert_eq!(body["heart_rates"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_predict_route() {
        let (status, body) = call(app_with(offline()), Method::GET, "/digital-twin/predict", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["risk_level"], "Moderate");
        assert_eq!(body["forecast"][0]["time"], "+30m");
        assert_eq!(body["forecast"][0]["spike_probability"], "65.2%");
    }

    #[tokio::test]
    async fn test_scrub_in_route() {
        let monitor = offline();

        let (status, body) = call(
            app_with(monitor.clone()),
            Method::POST,
            "/auth/scrub-in",
            Some(serde_json::json!({ "neural_sig": "nope" })),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["detail"], "Biometric Mismatch");

        let (status, body) = call(
            app_with(monitor.clone()),
            Method::POST,
            "/auth/scrub-in",
            Some(serde_json::json!({ "neural_sig": "VERIFY_THORNE_01" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["auth"], "SUCCESS");
        assert!(monitor.is_scrubbed_in());
    }

    #[tokio::test]
    async fn test_ask_ai_route_logs_tachycardia() {
        let monitor = offline();

        let (status, body) = call(
            app_with(monitor.clone()),
            Method::POST,
            "/ask-ai",
            Some(serde_json::json!({ "vitals": { "heart_rate": 131, "bp": "125/85" } })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["report"],
            "STABLE: specialist panel suggests monitoring HR 131 BPM."
        );

        let (_, body) = call(app_with(monitor), Method::GET, "/auth-logs", None).await;
        let logs = body["logs"].as_array().unwrap();
        assert_eq!(logs.len(), 3);
        assert_eq!(logs[0]["status"], "CRITICAL");
    }

    #[tokio::test]
    async fn test_ask_ai_defaults() {
        let advisor = Arc::new(ScriptedAdvisor::replying("Panel agrees."));
        let monitor = Arc::new(Monitor::new(MonitorConfig::default(), advisor.clone()));

        let (_, body) = call(
            app_with(monitor),
            Method::POST,
            "/ask-ai",
            Some(serde_json::json!({})),
        )
        .await;
        assert_eq!(body["report"], "Panel agrees.");

        let prompts = advisor.prompts.lock().unwrap();
        assert!(prompts[0].contains("Vitals: HR 0, BP 0/0. Query: Analyze current status.."));
    }

    #[tokio::test]
    async fn test_stability_route() {
        let (_, body) = call(
            app_with(offline()),
            Method::POST,
            "/neural-sync/stability",
            Some(serde_json::json!({ "vitals": { "heart_rate": 120 } })),
        )
        .await;
        assert_eq!(body["score"], 65);
        assert_eq!(body["mode"], "normal");
    }

    #[tokio::test]
    async fn test_analyze_scan_route() {
        let monitor = Arc::new(Monitor::new(
            MonitorConfig::default(),
            Arc::new(ScriptedAdvisor::replying("Clear lungs.")),
        ));

        let boundary = "XBOUNDARY";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"file\"; filename=\"scan.png\"\r\n\
             Content-Type: image/png\r\n\r\n\
             PNGDATA\r\n\
             --{boundary}--\r\n"
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/analyze-scan")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app_with(monitor).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let analysis: ScanAnalysis = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(analysis.analysis, "Vision Engine: Clear lungs.");
        assert_eq!(analysis.confidence, 0.98);
    }

    #[tokio::test]
    async fn test_analyze_scan_without_file() {
        let boundary = "XBOUNDARY";
        let body = format!(
            "--{boundary}\r\n\
             Content-Disposition: form-data; name=\"note\"\r\n\r\n\
             hello\r\n\
             --{boundary}--\r\n"
        );
        let request = Request::builder()
            .method(Method::POST)
            .uri("/analyze-scan")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={boundary}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = app_with(offline()).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let analysis: ScanAnalysis = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(analysis.confidence, 0.0);
        assert_eq!(
            analysis.analysis,
            "Vision Engine Error: Invalid request: missing 'file' field"
        );
    }

    #[tokio::test]
    async fn test_health_route() {
        let (status, body) = call(app_with(offline()), Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["open_streams"], 0);
        assert_eq!(body["advisor"], "offline");
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(
            MonitorError::BiometricMismatch.into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            MonitorError::Validation("x".to_string()).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            MonitorError::Advisor("x".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    type WsClient =
        tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

    async fn next_sample(client: &mut WsClient) -> TelemetrySample {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(5), client.next())
                .await
                .expect("no frame within timeout")
                .expect("socket closed")
                .expect("socket error");
            if let WsMessage::Text(text) = message {
                return serde_json::from_str(&text).unwrap();
            }
        }
    }

    async fn wait_for_open_streams(monitor: &Monitor, expected: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while monitor.open_streams() != expected {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("open stream count did not settle");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_vitals_socket_streams_per_connection() {
        let config = MonitorConfig {
            tick_interval: Duration::from_millis(20),
            ..MonitorConfig::default()
        };
        let monitor = Arc::new(Monitor::new(config, Arc::new(OfflineAdvisor)));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(Arc::clone(&monitor));
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let url = format!("ws://{addr}/ws/vitals");
        let (mut a, _) = connect_async(url.as_str()).await.unwrap();
        let (mut b, _) = connect_async(url.as_str()).await.unwrap();

        let first = next_sample(&mut a).await;
        assert!(NORMAL_HR_RANGE.contains(&first.heart_rate));
        assert_eq!(first.baseline_ghost, 72);
        assert!(!first.alert);
        assert_eq!(first.heatmap.len(), 8);
        next_sample(&mut b).await;
        assert_eq!(monitor.open_streams(), 2);

        // A vanished client ends only its own stream
        drop(b);
        wait_for_open_streams(&monitor, 1).await;
        for _ in 0..5 {
            next_sample(&mut a).await;
        }
        assert_eq!(monitor.open_streams(), 1);

        // Mode changes reach the surviving stream
        monitor.set_code_blue();
        let mut sample = next_sample(&mut a).await;
        while !sample.alert {
            sample = next_sample(&mut a).await;
        }
        assert!(ALERT_HR_RANGE.contains(&sample.heart_rate));

        a.close(None).await.ok();
        wait_for_open_streams(&monitor, 0).await;
    }
}

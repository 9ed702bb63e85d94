use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use iris_camera::UsbCamera;
use iris_capture::CapturePort;
use iris_grabber::FrameGrabber;

use crate::config::ServerConfig;
use crate::error::ApiError;
use crate::stream;

/// Shared state for the HTTP surface.
#[derive(Clone)]
pub struct AppState {
    grabber: Arc<FrameGrabber>,
    config: Arc<ServerConfig>,
}

impl AppState {
    /// State over an existing grabber. Tests hand in mock-backed ones.
    pub fn new(grabber: Arc<FrameGrabber>, config: ServerConfig) -> Self {
        Self {
            grabber,
            config: Arc::new(config),
        }
    }

    /// State wired to a real USB camera built from `config.camera`.
    pub fn with_usb_camera(config: ServerConfig) -> Self {
        let camera = config.camera.clone();
        let enabled = config.enabled;
        let grabber = FrameGrabber::new(
            Box::new(move || {
                Box::new(UsbCamera::new(camera.clone())) as Box<dyn CapturePort + Send>
            }),
            enabled,
        );
        Self::new(Arc::new(grabber), config)
    }

    pub fn grabber(&self) -> &Arc<FrameGrabber> {
        &self.grabber
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/camera/status", get(camera_status))
        .route("/camera/enable", put(camera_enable))
        .route("/camera/frame", get(camera_frame))
        .route("/camera/stream", get(camera_stream))
        .route("/camera/reopen", post(camera_reopen))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn index() -> &'static str {
    "iris camera service. See /health /camera/status /camera/frame /camera/stream /camera/enable"
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.grabber.status();
    Json(json!({
        "ok": true,
        "enabled": status.enabled,
        "running": status.running,
    }))
}

async fn camera_status(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = state.grabber.status();
    Json(json!({
        "enabled": status.enabled,
        "running": status.running,
        "device": status.device,
        "meta": status.metadata,
        "width": state.config.camera.width(),
        "height": state.config.camera.height(),
        "fps": state.config.camera.fps(),
    }))
}

#[derive(Debug, Deserialize)]
struct EnableRequest {
    enabled: Option<bool>,
}

/// Switch the camera on or off. The grabber transition blocks (it joins
/// the acquisition thread on stop), so it runs off the async runtime.
async fn camera_enable(
    State(state): State<AppState>,
    Json(request): Json<EnableRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let enabled = request.enabled.ok_or(ApiError::MissingField("enabled"))?;

    let grabber = Arc::clone(&state.grabber);
    tokio::task::spawn_blocking(move || grabber.set_enabled(enabled))
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .map_err(|err| ApiError::Start(err.to_string()))?;

    Ok(Json(json!({ "enabled": state.grabber.enabled() })))
}

async fn camera_frame(State(state): State<AppState>) -> Result<Response, ApiError> {
    if !state.grabber.enabled() {
        return Err(ApiError::Disabled);
    }
    let (payload, metadata) = state.grabber.latest().ok_or(ApiError::NoFrame)?;
    let content_type = stream::content_type_for(&metadata);
    Ok(([(header::CONTENT_TYPE, content_type)], payload).into_response())
}

async fn camera_stream(State(state): State<AppState>) -> Result<Response, ApiError> {
    if !state.grabber.enabled() {
        return Err(ApiError::Disabled);
    }

    let body = Body::from_stream(stream::multipart_stream(Arc::clone(&state.grabber)));
    Ok((
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={}", stream::BOUNDARY),
            ),
            (header::CACHE_CONTROL, "no-cache, private".to_string()),
            (header::PRAGMA, "no-cache".to_string()),
            (header::AGE, "0".to_string()),
        ],
        body,
    )
        .into_response())
}

/// Release and reacquire the device, with a settle pause in between.
async fn camera_reopen(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    if !state.grabber.enabled() {
        return Err(ApiError::Disabled);
    }

    let grabber = Arc::clone(&state.grabber);
    tokio::task::spawn_blocking(move || grabber.stop())
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    tokio::time::sleep(state.config.settle).await;

    let grabber = Arc::clone(&state.grabber);
    tokio::task::spawn_blocking(move || grabber.start())
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .map_err(|err| ApiError::Start(err.to_string()))?;

    Ok(Json(json!({ "ok": true })))
}

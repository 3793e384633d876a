//! Callbridge server library logic.

pub mod api;
pub mod api_socket;
pub mod background;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use callbridge_audio::AudioError;
use callbridge_calls::{AudioBridge, CallController, ControllerConfig, EventRouter, SessionRegistry};
use callbridge_telephony::TelephonyProvider;
use callbridge_voice::SpeechPipeline;
use config::Config;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Every live call session.
    pub registry: Arc<SessionRegistry>,
    /// Applies webhooks and socket observations to sessions.
    pub router: Arc<EventRouter>,
    /// Outbound call control and answer instructions.
    pub controller: Arc<CallController>,
    /// Per-socket audio loop.
    pub bridge: AudioBridge,
}

impl AppState {
    /// Wires the call components together around one provider and one
    /// speech pipeline.
    pub fn new(
        config: &Config,
        provider: Arc<dyn TelephonyProvider>,
        pipeline: SpeechPipeline,
    ) -> Result<Self, AudioError> {
        let registry = Arc::new(SessionRegistry::new());
        let router = Arc::new(EventRouter::new(registry.clone()));
        let controller = Arc::new(CallController::new(
            router.clone(),
            provider,
            ControllerConfig {
                from_number: config.telephony.from_number.clone(),
                socket_url: config.socket_url(),
                transport: config.audio.transport(),
                answer_stream_url: config.audio.answer_stream_url.clone(),
            },
        ));
        // Fail at startup rather than on the first socket.
        callbridge_audio::UtteranceSegmenter::new(
            config.segmenter.clone(),
            pipeline.codec().pipeline_rate(),
        )?;
        let bridge = AudioBridge::new(
            router.clone(),
            Arc::new(pipeline),
            config.segmenter.clone(),
            &config.pipeline,
        );

        Ok(Self {
            registry,
            router,
            controller,
            bridge,
        })
    }
}

/// Maximum request body size. Webhook payloads and call requests are small.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Health check handler.
///
/// Returns `200 OK` with server status and version.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(api::root_handler))
        .route("/health", get(health))
        .route("/call", post(api::create_call_handler))
        .route("/calls", get(api::list_calls_handler))
        .route("/call-status", get(api::call_status_handler))
        .route("/end-call", post(api::end_call_handler))
        .route("/event", post(api::event_handler))
        .route("/answer", get(api::answer_handler))
        .route("/socket", get(api_socket::socket_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}

//! Callbridge server binary.
//!
//! Starts an axum HTTP server with structured logging, the stale-session
//! sweeper, and graceful shutdown on SIGTERM/SIGINT.

use callbridge_server::{app, background, config, AppState};
use callbridge_telephony::VonageClient;
use callbridge_voice::{ChatResponder, PiperSynthesizer, SpeechPipeline, WhisperTranscriber};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

fn resolve_config_path() -> (Option<String>, &'static str) {
    if let Some(path) = std::env::args()
        .nth(1)
        .filter(|value| !value.trim().is_empty())
    {
        return (Some(path), "cli-arg");
    }

    if let Ok(path) = std::env::var("CALLBRIDGE_CONFIG_PATH") {
        if !path.trim().is_empty() {
            return (Some(path), "env-var");
        }
    }

    (None, "default")
}

#[tokio::main]
async fn main() {
    let (resolved_config_path, config_source) = resolve_config_path();
    let selected_config_path = resolved_config_path.as_deref().or(Some("config.toml"));

    // Load configuration
    let config = config::load_config(selected_config_path)
        .expect("failed to load configuration, the server cannot start without valid config");

    // Initialize tracing
    let filter =
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if config.logging.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!(
        source = config_source,
        path = selected_config_path.unwrap_or("<none>"),
        "resolved startup configuration path"
    );

    // Telephony provider
    let provider = VonageClient::from_config(&config.telephony)
        .expect("failed to initialize Vonage client, check the [telephony] section");

    // Speech pipeline
    let codec = config
        .audio
        .codec()
        .expect("invalid [audio] settings");
    let responder = ChatResponder::new(&config.llm).expect("invalid [llm] settings");
    if config.stt.model_path.is_empty() {
        tracing::warn!("stt.model_path is empty, transcription will fail");
    }
    let pipeline = SpeechPipeline::new(
        Arc::new(WhisperTranscriber::new(
            &config.stt.model_path,
            &config.stt.binary_path,
        )),
        Arc::new(responder),
        Arc::new(PiperSynthesizer::from_config(&config.tts)),
        codec,
        config.pipeline.min_confidence,
    );

    let state = AppState::new(&config, Arc::new(provider), pipeline)
        .expect("invalid [segmenter] settings");

    // Spawn background sweeper
    tokio::spawn(background::start_session_sweeper(
        state.router.clone(),
        config.sessions.stale_after_secs,
        config.sessions.sweep_interval_secs,
    ));

    // Build application
    let app = app(state);
    let addr = SocketAddr::new(config.server.host, config.server.port);

    tracing::info!(
        %addr,
        public_url = %config.server.public_url,
        socket_url = %config.socket_url(),
        "starting callbridge server"
    );

    let listener = TcpListener::bind(addr)
        .await
        .expect("failed to bind to address, is another process using this port?");

    // Serve with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    tracing::info!("callbridge server shut down");
}

/// Waits for a SIGINT (Ctrl+C) or SIGTERM signal for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { tracing::info!("received SIGINT, initiating graceful shutdown"); }
        () = terminate => { tracing::info!("received SIGTERM, initiating graceful shutdown"); }
    }
}

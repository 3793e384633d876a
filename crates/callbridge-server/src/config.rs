//! Server configuration loading from file and environment variables.

use callbridge_audio::{AudioCodec, AudioError, AudioFormat, Encoding, SegmenterConfig};
use callbridge_telephony::TelephonyConfig;
use callbridge_voice::{LlmConfig, PipelineConfig, SttConfig, TtsConfig};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Telephony provider account and webhooks.
    #[serde(default)]
    pub telephony: TelephonyConfig,

    /// Socket audio format.
    #[serde(default)]
    pub audio: AudioConfig,

    /// Utterance boundary detection.
    #[serde(default)]
    pub segmenter: SegmenterConfig,

    /// Turn-taking limits.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub stt: SttConfig,

    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub tts: TtsConfig,

    /// Session housekeeping.
    #[serde(default)]
    pub sessions: SessionsConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Externally reachable base URL. The provider's webhooks and the audio
    /// socket URL handed out in answer instructions are built from it.
    #[serde(default = "default_public_url")]
    pub public_url: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "callbridge_calls=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Audio format on the provider socket and inside the pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    #[serde(default)]
    pub encoding: Encoding,

    #[serde(default = "default_sample_rate")]
    pub transport_sample_rate: u32,

    /// Rate the transcriber receives. whisper.cpp expects 16 kHz.
    #[serde(default = "default_sample_rate")]
    pub pipeline_sample_rate: u32,

    #[serde(default = "default_frame_ms")]
    pub frame_ms: u32,

    /// Optional audio played to callers before the socket connects.
    #[serde(default)]
    pub answer_stream_url: Option<String>,
}

/// Stale-session sweeping.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionsConfig {
    /// Sessions not streaming and idle for this long are terminated.
    /// `0` disables the sweeper.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_public_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_sample_rate() -> u32 {
    16_000
}

fn default_frame_ms() -> u32 {
    20
}

fn default_stale_after_secs() -> u64 {
    900
}

fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_url: default_public_url(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            encoding: Encoding::default(),
            transport_sample_rate: default_sample_rate(),
            pipeline_sample_rate: default_sample_rate(),
            frame_ms: default_frame_ms(),
            answer_stream_url: None,
        }
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl AudioConfig {
    pub fn transport(&self) -> AudioFormat {
        AudioFormat {
            encoding: self.encoding,
            sample_rate: self.transport_sample_rate,
        }
    }

    pub fn codec(&self) -> Result<AudioCodec, AudioError> {
        AudioCodec::new(self.transport(), self.pipeline_sample_rate, self.frame_ms)
    }
}

impl Config {
    fn public_base(&self) -> &str {
        self.server.public_url.trim_end_matches('/')
    }

    /// WebSocket URL of the audio endpoint, derived from `server.public_url`.
    pub fn socket_url(&self) -> String {
        let base = self.public_base();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };
        format!("{}/socket", ws_base)
    }

    /// Fills in webhook URLs left empty from `server.public_url`.
    fn derive_webhooks(&mut self) {
        if self.telephony.answer_url.is_empty() {
            self.telephony.answer_url = format!("{}/answer", self.public_base());
        }
        if self.telephony.event_url.is_empty() {
            self.telephony.event_url = format!("{}/event", self.public_base());
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CALLBRIDGE_HOST` overrides `server.host`
/// - `CALLBRIDGE_PORT` (or `PORT`) overrides `server.port`
/// - `CALLBRIDGE_PUBLIC_URL` overrides `server.public_url`
/// - `CALLBRIDGE_LOG_LEVEL` overrides `logging.level`
/// - `CALLBRIDGE_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `VONAGE_APPLICATION_ID`, `VONAGE_PRIVATE_KEY_PATH`, `VONAGE_NUMBER`
///   override the matching `telephony` keys
/// - `ANSWER_WEBHOOK_URL` and `WEBHOOK_URL` override `telephony.answer_url`
///   and `telephony.event_url`
/// - `OPENAI_API_KEY` overrides `llm.api_key`
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    load_config_with_env(path, |key| std::env::var(key).ok())
}

/// [`load_config`] with an explicit environment lookup.
pub fn load_config_with_env(
    path: Option<&str>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Some(host) = env("CALLBRIDGE_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = env("CALLBRIDGE_PORT").or_else(|| env("PORT")) {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(url) = env("CALLBRIDGE_PUBLIC_URL") {
        config.server.public_url = url;
    }
    if let Some(level) = env("CALLBRIDGE_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = env("CALLBRIDGE_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(id) = env("VONAGE_APPLICATION_ID") {
        config.telephony.application_id = id;
    }
    if let Some(path) = env("VONAGE_PRIVATE_KEY_PATH") {
        config.telephony.private_key_path = path;
    }
    if let Some(number) = env("VONAGE_NUMBER") {
        config.telephony.from_number = number;
    }
    if let Some(url) = env("ANSWER_WEBHOOK_URL") {
        config.telephony.answer_url = url;
    }
    if let Some(url) = env("WEBHOOK_URL") {
        config.telephony.event_url = url;
    }
    if let Some(key) = env("OPENAI_API_KEY") {
        config.llm.api_key = key;
    }

    config.derive_webhooks();
    Ok(config)
}

use serde::{Deserialize, Serialize};
use std::fmt;

fn default_stt_binary() -> String {
    "whisper-cli".to_string()
}

fn default_llm_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_system_prompt() -> String {
    "You are a helpful assistant on a phone call. Answer in one or two short spoken sentences."
        .to_string()
}

fn default_max_tokens() -> u32 {
    150
}

fn default_llm_timeout_secs() -> u64 {
    20
}

fn default_tts_binary() -> String {
    "piper".to_string()
}

fn default_tts_sample_rate() -> u32 {
    22_050
}

fn default_tts_speed() -> f32 {
    1.0
}

fn default_turn_timeout_ms() -> u64 {
    15_000
}

fn default_min_confidence() -> f32 {
    0.0
}

fn default_max_pending_utterances() -> usize {
    4
}

/// Speech-to-text binary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SttConfig {
    #[serde(default = "default_stt_binary")]
    pub binary_path: String,
    #[serde(default)]
    pub model_path: String,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            binary_path: default_stt_binary(),
            model_path: String::new(),
        }
    }
}

/// Chat-completions endpoint settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,
    #[serde(default, skip_serializing)]
    pub api_key: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: default_llm_api_base(),
            api_key: String::new(),
            model: default_llm_model(),
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlmConfig")
            .field("api_base", &self.api_base)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("system_prompt", &self.system_prompt)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Text-to-speech binary settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default = "default_tts_binary")]
    pub binary_path: String,
    #[serde(default)]
    pub model_path: String,
    /// Output rate of the voice model. Piper writes raw PCM without a header,
    /// so this has to match the model's JSON config.
    #[serde(default = "default_tts_sample_rate")]
    pub sample_rate: u32,
    /// Speaking rate multiplier, 0.1 to 10.0.
    #[serde(default = "default_tts_speed")]
    pub speed: f32,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            binary_path: default_tts_binary(),
            model_path: String::new(),
            sample_rate: default_tts_sample_rate(),
            speed: default_tts_speed(),
        }
    }
}

/// Turn-taking limits applied by the audio bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Upper bound on one transcribe/respond/synthesize turn.
    #[serde(default = "default_turn_timeout_ms")]
    pub turn_timeout_ms: u64,
    /// Transcripts reporting a lower confidence are treated as silence.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,
    /// Utterances waiting behind an in-flight turn. The oldest is dropped
    /// when the queue is full.
    #[serde(default = "default_max_pending_utterances")]
    pub max_pending_utterances: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            turn_timeout_ms: default_turn_timeout_ms(),
            min_confidence: default_min_confidence(),
            max_pending_utterances: default_max_pending_utterances(),
        }
    }
}

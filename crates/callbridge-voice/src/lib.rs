//! Speech capabilities for callbridge.
//!
//! Defines the transcription, response-generation and synthesis traits, the
//! [`SpeechPipeline`] that chains them for one conversational turn, and the
//! bundled implementations: whisper.cpp and piper as child processes, and an
//! OpenAI-compatible chat-completions client.

pub mod config;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod stt;
pub mod tts;

pub use config::{LlmConfig, PipelineConfig, SttConfig, TtsConfig};
pub use error::VoiceError;
pub use llm::ChatResponder;
pub use pipeline::{
    ResponseGenerator, SilentReason, SpeechPipeline, SynthesizedAudio, Synthesizer, Transcriber,
    Transcript, TurnOutcome,
};
pub use stt::WhisperTranscriber;
pub use tts::PiperSynthesizer;

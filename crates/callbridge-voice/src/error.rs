use callbridge_audio::AudioError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("STT error: {0}")]
    Stt(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("TTS error: {0}")]
    Tts(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Audio conversion error: {0}")]
    Audio(#[from] AudioError),
}

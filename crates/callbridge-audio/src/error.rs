use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("16-bit PCM payload has odd length: {0} bytes")]
    OddLength(usize),

    #[error("invalid sample rate: {0} Hz")]
    InvalidSampleRate(u32),

    #[error("invalid audio configuration: {0}")]
    Config(String),

    #[error("resampling failed: {0}")]
    Resample(String),
}

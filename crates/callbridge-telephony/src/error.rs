use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelephonyError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("provider rejected the request with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("failed to sign application token: {0}")]
    Auth(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("unexpected provider response: {0}")]
    Decode(String),
}

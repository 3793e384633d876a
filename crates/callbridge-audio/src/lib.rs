//! Audio plumbing between the telephony transport and the speech pipeline.
//!
//! The telephony provider speaks in fixed-size frames of a transport format
//! (linear 16-bit PCM or G.711 μ-law at some sample rate). Transcription and
//! synthesis work on 16-bit samples at their own rates. [`AudioCodec`] converts
//! between the two, with a [`FrameDecoder`] per inbound stream so resampling
//! stays continuous across frames; [`UtteranceSegmenter`] cuts the decoded
//! stream into utterances, one per conversational turn.

pub mod codec;
pub mod error;
pub mod resample;
pub mod segment;

pub use codec::{
    mulaw_decode, mulaw_encode, pcm16le_to_samples, samples_to_pcm16le, AudioCodec, AudioFormat,
    Encoding, FrameDecoder,
};
pub use error::AudioError;
pub use resample::{resample, StreamResampler};
pub use segment::{BoundaryPolicy, CloseReason, SegmenterConfig, Utterance, UtteranceSegmenter};

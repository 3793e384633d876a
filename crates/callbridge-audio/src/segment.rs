//! Utterance boundary detection.
//!
//! The segmenter consumes decoded samples in analysis frames and emits an
//! [`Utterance`] whenever the configured policy decides a turn is over.

use crate::error::AudioError;
use serde::{Deserialize, Serialize};

/// How the segmenter decides where an utterance ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryPolicy {
    /// Speech opens on an energy threshold and closes after trailing silence
    /// or at the maximum duration.
    #[default]
    Energy,
    /// Emit every `window_frames` analysis frames regardless of silence.
    /// Windows without a single voiced frame are dropped.
    FixedWindow,
}

/// Segmenter thresholds. Every field has a default, so a partial TOML table
/// is enough to override one value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    pub policy: BoundaryPolicy,
    /// RMS amplitude (in 16-bit sample units) at or above which a frame
    /// counts as voiced.
    pub silence_rms: f32,
    /// Trailing silence that closes an utterance.
    pub close_silence_ms: u32,
    /// Utterances with less voiced audio than this are discarded as noise.
    pub min_speech_ms: u32,
    /// Hard cap on utterance length.
    pub max_utterance_ms: u32,
    /// Window length for [`BoundaryPolicy::FixedWindow`].
    pub window_frames: u32,
    /// Analysis frame length.
    pub frame_ms: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            policy: BoundaryPolicy::Energy,
            silence_rms: 500.0,
            close_silence_ms: 600,
            min_speech_ms: 200,
            max_utterance_ms: 10_000,
            window_frames: 150,
            frame_ms: 20,
        }
    }
}

/// Why an utterance was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Silence,
    MaxLength,
    Window,
}

/// One bounded span of speech, ready for transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct Utterance {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
    pub voiced_ms: u32,
    pub close_reason: CloseReason,
}

impl Utterance {
    pub fn duration_ms(&self) -> u64 {
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Stateful utterance detector for one audio stream.
#[derive(Debug)]
pub struct UtteranceSegmenter {
    cfg: SegmenterConfig,
    sample_rate: u32,
    frame_len: usize,
    /// Samples that did not fill a whole analysis frame yet.
    carry: Vec<i16>,
    current: Vec<i16>,
    in_speech: bool,
    voiced_ms: u32,
    silence_ms: u32,
    frames_in_window: u32,
}

impl UtteranceSegmenter {
    pub fn new(cfg: SegmenterConfig, sample_rate: u32) -> Result<Self, AudioError> {
        if sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate(sample_rate));
        }
        let frame_len = (sample_rate as usize * cfg.frame_ms as usize) / 1000;
        if frame_len == 0 {
            return Err(AudioError::Config(format!(
                "analysis frame of {} ms holds no samples at {} Hz",
                cfg.frame_ms, sample_rate
            )));
        }
        if cfg.policy == BoundaryPolicy::FixedWindow && cfg.window_frames == 0 {
            return Err(AudioError::Config(
                "fixed-window policy needs window_frames > 0".to_string(),
            ));
        }

        Ok(Self {
            cfg,
            sample_rate,
            frame_len,
            carry: Vec::new(),
            current: Vec::new(),
            in_speech: false,
            voiced_ms: 0,
            silence_ms: 0,
            frames_in_window: 0,
        })
    }

    /// Returns `true` while an utterance is being accumulated.
    pub fn is_collecting(&self) -> bool {
        !self.current.is_empty()
    }

    /// Feeds decoded samples and returns every utterance they complete.
    pub fn push(&mut self, samples: &[i16]) -> Vec<Utterance> {
        self.carry.extend_from_slice(samples);

        let mut done = Vec::new();
        let whole = self.carry.len() - self.carry.len() % self.frame_len;
        let frames: Vec<i16> = self.carry.drain(..whole).collect();

        for frame in frames.chunks_exact(self.frame_len) {
            let utterance = match self.cfg.policy {
                BoundaryPolicy::Energy => self.step_energy(frame),
                BoundaryPolicy::FixedWindow => self.step_window(frame),
            };
            if let Some(u) = utterance {
                done.push(u);
            }
        }
        done
    }

    fn step_energy(&mut self, frame: &[i16]) -> Option<Utterance> {
        let voiced = rms(frame) >= self.cfg.silence_rms;
        let frame_ms = self.cfg.frame_ms;

        if !self.in_speech {
            if !voiced {
                return None;
            }
            self.in_speech = true;
        }

        self.current.extend_from_slice(frame);
        if voiced {
            self.voiced_ms += frame_ms;
            self.silence_ms = 0;
        } else {
            self.silence_ms += frame_ms;
        }

        if self.silence_ms >= self.cfg.close_silence_ms {
            return self.close(CloseReason::Silence);
        }
        if self.current_ms() >= self.cfg.max_utterance_ms as u64 {
            return self.close(CloseReason::MaxLength);
        }
        None
    }

    fn step_window(&mut self, frame: &[i16]) -> Option<Utterance> {
        if rms(frame) >= self.cfg.silence_rms {
            self.voiced_ms += self.cfg.frame_ms;
        }
        self.current.extend_from_slice(frame);
        self.frames_in_window += 1;

        if self.frames_in_window >= self.cfg.window_frames {
            return self.close(CloseReason::Window);
        }
        None
    }

    fn close(&mut self, reason: CloseReason) -> Option<Utterance> {
        let voiced_ms = self.voiced_ms;
        let samples = std::mem::take(&mut self.current);
        self.clear_current();

        let enough = match reason {
            CloseReason::Window => voiced_ms > 0,
            _ => voiced_ms >= self.cfg.min_speech_ms,
        };
        if !enough {
            tracing::debug!(voiced_ms, ?reason, "discarding utterance below speech floor");
            return None;
        }

        Some(Utterance {
            samples,
            sample_rate: self.sample_rate,
            voiced_ms,
            close_reason: reason,
        })
    }

    fn clear_current(&mut self) {
        self.current.clear();
        self.in_speech = false;
        self.voiced_ms = 0;
        self.silence_ms = 0;
        self.frames_in_window = 0;
    }

    fn current_ms(&self) -> u64 {
        self.current.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Root-mean-square amplitude of a frame.
fn rms(frame: &[i16]) -> f32 {
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / frame.len() as f64).sqrt() as f32
}

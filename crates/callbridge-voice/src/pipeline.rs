//! Transcribe, respond, synthesize.
//!
//! Each capability is an object-safe trait so the bridge can run against the
//! bundled process/HTTP implementations or any other backend.

use crate::error::VoiceError;
use async_trait::async_trait;
use callbridge_audio::{pcm16le_to_samples, samples_to_pcm16le, AudioCodec, Utterance};
use std::sync::Arc;

/// Result of a transcription.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    /// May be empty when nothing intelligible was said.
    pub text: String,
    /// Backend confidence in `0.0..=1.0`, when it reports one.
    pub confidence: Option<f32>,
}

/// Raw mono 16-bit little-endian PCM from a synthesizer.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub pcm16le: Vec<u8>,
    pub sample_rate: u32,
}

#[async_trait]
pub trait Transcriber: Send + Sync + 'static {
    async fn transcribe(&self, pcm16le: &[u8], sample_rate: u32) -> Result<Transcript, VoiceError>;
}

#[async_trait]
pub trait ResponseGenerator: Send + Sync + 'static {
    async fn generate(&self, prompt: &str) -> Result<String, VoiceError>;
}

#[async_trait]
pub trait Synthesizer: Send + Sync + 'static {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, VoiceError>;
}

/// Why a turn produced no audio.
#[derive(Debug, Clone, PartialEq)]
pub enum SilentReason {
    EmptyTranscript,
    LowConfidence(f32),
    EmptyResponse,
}

/// What one pipeline run produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// Nothing to say back. No generation or synthesis happened past the
    /// point named by the reason.
    Silent(SilentReason),
    /// Response audio, already cut into transport frames.
    Spoke {
        transcript: String,
        response: String,
        frames: Vec<Vec<u8>>,
    },
}

/// The three speech capabilities behind one call.
///
/// Stateless per run; one pipeline is shared by every call in the process.
#[derive(Clone)]
pub struct SpeechPipeline {
    transcriber: Arc<dyn Transcriber>,
    responder: Arc<dyn ResponseGenerator>,
    synthesizer: Arc<dyn Synthesizer>,
    codec: AudioCodec,
    min_confidence: f32,
}

impl std::fmt::Debug for SpeechPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechPipeline")
            .field("codec", &self.codec)
            .field("min_confidence", &self.min_confidence)
            .finish_non_exhaustive()
    }
}

impl SpeechPipeline {
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        responder: Arc<dyn ResponseGenerator>,
        synthesizer: Arc<dyn Synthesizer>,
        codec: AudioCodec,
        min_confidence: f32,
    ) -> Self {
        Self {
            transcriber,
            responder,
            synthesizer,
            codec,
            min_confidence,
        }
    }

    pub fn codec(&self) -> &AudioCodec {
        &self.codec
    }

    /// Runs one turn for `utterance`.
    pub async fn run(&self, utterance: &Utterance) -> Result<TurnOutcome, VoiceError> {
        let pcm = samples_to_pcm16le(&utterance.samples);
        let transcript = self
            .transcriber
            .transcribe(&pcm, utterance.sample_rate)
            .await?;

        let text = transcript.text.trim();
        if text.is_empty() {
            return Ok(TurnOutcome::Silent(SilentReason::EmptyTranscript));
        }
        if let Some(confidence) = transcript.confidence {
            if confidence < self.min_confidence {
                return Ok(TurnOutcome::Silent(SilentReason::LowConfidence(confidence)));
            }
        }

        let response = self.responder.generate(text).await?;
        let response = response.trim();
        if response.is_empty() {
            return Ok(TurnOutcome::Silent(SilentReason::EmptyResponse));
        }

        let audio = self.synthesizer.synthesize(response).await?;
        let samples = pcm16le_to_samples(&audio.pcm16le)?;
        let frames = self.codec.frames(&samples, audio.sample_rate)?;

        Ok(TurnOutcome::Spoke {
            transcript: text.to_string(),
            response: response.to_string(),
            frames,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use callbridge_audio::{AudioFormat, CloseReason};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedTranscriber(Transcript);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _pcm: &[u8], _rate: u32) -> Result<Transcript, VoiceError> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct CountingResponder(AtomicUsize);

    #[async_trait]
    impl ResponseGenerator for CountingResponder {
        async fn generate(&self, prompt: &str) -> Result<String, VoiceError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(format!("you said {}", prompt))
        }
    }

    struct ToneSynthesizer;

    #[async_trait]
    impl Synthesizer for ToneSynthesizer {
        async fn synthesize(&self, _text: &str) -> Result<SynthesizedAudio, VoiceError> {
            // 30 ms at 8 kHz.
            Ok(SynthesizedAudio {
                pcm16le: samples_to_pcm16le(&vec![1_000i16; 240]),
                sample_rate: 8_000,
            })
        }
    }

    struct BrokenSynthesizer;

    #[async_trait]
    impl Synthesizer for BrokenSynthesizer {
        async fn synthesize(&self, _text: &str) -> Result<SynthesizedAudio, VoiceError> {
            Err(VoiceError::Tts("voice missing".to_string()))
        }
    }

    fn utterance() -> Utterance {
        Utterance {
            samples: vec![0; 3_200],
            sample_rate: 16_000,
            voiced_ms: 200,
            close_reason: CloseReason::Silence,
        }
    }

    fn pipeline(
        transcript: Transcript,
        responder: Arc<CountingResponder>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> SpeechPipeline {
        let codec = AudioCodec::new(AudioFormat::l16(16_000), 16_000, 20).unwrap();
        SpeechPipeline::new(
            Arc::new(FixedTranscriber(transcript)),
            responder,
            synthesizer,
            codec,
            0.5,
        )
    }

    #[tokio::test]
    async fn spoken_turn_is_framed_at_transport_rate() {
        let responder = Arc::new(CountingResponder::default());
        let p = pipeline(
            Transcript {
                text: " hello ".to_string(),
                confidence: Some(0.9),
            },
            responder.clone(),
            Arc::new(ToneSynthesizer),
        );

        match p.run(&utterance()).await.unwrap() {
            TurnOutcome::Spoke {
                transcript,
                response,
                frames,
            } => {
                assert_eq!(transcript, "hello");
                assert_eq!(response, "you said hello");
                // 240 samples at 8 kHz become 480 at 16 kHz: two 640-byte frames.
                assert_eq!(frames.len(), 2);
                assert!(frames.iter().all(|f| f.len() == 640));
            }
            other => panic!("expected speech, got {:?}", other),
        }
        assert_eq!(responder.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_transcript_skips_generation() {
        let responder = Arc::new(CountingResponder::default());
        let p = pipeline(
            Transcript {
                text: "   ".to_string(),
                confidence: None,
            },
            responder.clone(),
            Arc::new(ToneSynthesizer),
        );
        assert_eq!(
            p.run(&utterance()).await.unwrap(),
            TurnOutcome::Silent(SilentReason::EmptyTranscript)
        );
        assert_eq!(responder.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn low_confidence_skips_generation() {
        let responder = Arc::new(CountingResponder::default());
        let p = pipeline(
            Transcript {
                text: "mumble".to_string(),
                confidence: Some(0.2),
            },
            responder.clone(),
            Arc::new(ToneSynthesizer),
        );
        assert_eq!(
            p.run(&utterance()).await.unwrap(),
            TurnOutcome::Silent(SilentReason::LowConfidence(0.2))
        );
        assert_eq!(responder.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn stage_failure_is_returned() {
        let p = pipeline(
            Transcript {
                text: "hello".to_string(),
                confidence: None,
            },
            Arc::new(CountingResponder::default()),
            Arc::new(BrokenSynthesizer),
        );
        assert!(matches!(p.run(&utterance()).await, Err(VoiceError::Tts(_))));
    }
}

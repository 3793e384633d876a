#![allow(dead_code)]

use async_trait::async_trait;
use callbridge_audio::{samples_to_pcm16le, SegmenterConfig};
use callbridge_server::config::Config;
use callbridge_server::AppState;
use callbridge_telephony::{OutboundCall, ProviderCallStatus, TelephonyError, TelephonyProvider};
use callbridge_voice::{
    ResponseGenerator, SpeechPipeline, SynthesizedAudio, Synthesizer, Transcriber, Transcript,
    VoiceError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory telephony provider that records every request.
#[derive(Default)]
pub struct FakeProvider {
    pub reject: AtomicBool,
    pub created: AtomicUsize,
    pub hangups: Mutex<Vec<String>>,
}

impl FakeProvider {
    pub fn hangups(&self) -> Vec<String> {
        self.hangups.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelephonyProvider for FakeProvider {
    async fn create_outbound_call(
        &self,
        _to: &str,
        _from: &str,
    ) -> Result<OutboundCall, TelephonyError> {
        let n = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject.load(Ordering::SeqCst) {
            return Err(TelephonyError::Rejected {
                status: 401,
                body: "invalid credentials".to_string(),
            });
        }
        Ok(OutboundCall {
            uuid: format!("leg-{}", n),
            conversation_uuid: format!("CON-{}", n),
            status: "started".to_string(),
        })
    }

    async fn get_call(&self, uuid: &str) -> Result<ProviderCallStatus, TelephonyError> {
        Ok(ProviderCallStatus {
            uuid: uuid.to_string(),
            conversation_uuid: None,
            status: "answered".to_string(),
            direction: Some("outbound".to_string()),
            to: None,
            from: None,
            start_time: None,
            end_time: None,
            duration: None,
        })
    }

    async fn terminate_call(&self, uuid: &str) -> Result<(), TelephonyError> {
        self.hangups.lock().unwrap().push(uuid.to_string());
        Ok(())
    }
}

pub struct FixedTranscriber;

#[async_trait]
impl Transcriber for FixedTranscriber {
    async fn transcribe(&self, _pcm: &[u8], _rate: u32) -> Result<Transcript, VoiceError> {
        Ok(Transcript {
            text: "hello there".to_string(),
            confidence: None,
        })
    }
}

pub struct EchoResponder;

#[async_trait]
impl ResponseGenerator for EchoResponder {
    async fn generate(&self, prompt: &str) -> Result<String, VoiceError> {
        Ok(format!("you said {}", prompt))
    }
}

/// Two 20 ms frames of a constant tone at 16 kHz.
pub struct ToneSynthesizer;

#[async_trait]
impl Synthesizer for ToneSynthesizer {
    async fn synthesize(&self, _text: &str) -> Result<SynthesizedAudio, VoiceError> {
        Ok(SynthesizedAudio {
            pcm16le: samples_to_pcm16le(&vec![1_000i16; 640]),
            sample_rate: 16_000,
        })
    }
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.telephony.from_number = "15550001111".to_string();
    config.segmenter = SegmenterConfig {
        close_silence_ms: 100,
        min_speech_ms: 60,
        ..SegmenterConfig::default()
    };
    config
}

pub fn test_state(provider: Arc<FakeProvider>) -> AppState {
    let config = test_config();
    let pipeline = SpeechPipeline::new(
        Arc::new(FixedTranscriber),
        Arc::new(EchoResponder),
        Arc::new(ToneSynthesizer),
        config.audio.codec().unwrap(),
        config.pipeline.min_confidence,
    );
    AppState::new(&config, provider, pipeline).unwrap()
}

/// One 20 ms L16 frame at 16 kHz with the given amplitude.
pub fn frame(amplitude: i16) -> Vec<u8> {
    let samples: Vec<i16> = (0..320)
        .map(|i| if i % 2 == 0 { amplitude } else { -amplitude })
        .collect();
    samples_to_pcm16le(&samples)
}

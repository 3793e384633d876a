use crate::config::TtsConfig;
use crate::error::VoiceError;
use crate::pipeline::{SynthesizedAudio, Synthesizer};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum text input size for TTS (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for TTS process execution.
const TTS_TIMEOUT: Duration = Duration::from_secs(60);

/// Synthesizer backed by the piper binary writing raw s16le to stdout.
#[derive(Debug, Clone)]
pub struct PiperSynthesizer {
    model_path: PathBuf,
    binary_path: PathBuf,
    sample_rate: u32,
    speed: f32,
}

impl PiperSynthesizer {
    pub fn new(
        model_path: impl Into<PathBuf>,
        binary_path: impl Into<PathBuf>,
        sample_rate: u32,
        speed: f32,
    ) -> Self {
        Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
            sample_rate,
            speed,
        }
    }

    pub fn from_config(cfg: &TtsConfig) -> Self {
        Self::new(&cfg.model_path, &cfg.binary_path, cfg.sample_rate, cfg.speed)
    }
}

#[async_trait]
impl Synthesizer for PiperSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<SynthesizedAudio, VoiceError> {
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        if !self.model_path.exists() {
            return Err(VoiceError::Tts(format!(
                "Model file not found: {:?}",
                self.model_path
            )));
        }

        if !(0.1..=10.0).contains(&self.speed) {
            return Err(VoiceError::Config(
                "Speed must be between 0.1 and 10.0".to_string(),
            ));
        }

        let mut command = Command::new(&self.binary_path);
        command
            .arg("--model")
            .arg(&self.model_path)
            .arg("--output_raw")
            // Length scale is the inverse of speed: 2.0x speed halves the length.
            .arg("--length_scale")
            .arg((1.0 / self.speed).to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Tts(format!("Failed to spawn piper: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Tts("Failed to open stdin".to_string()))?;
        let text_owned = text.to_string();

        // Write from a separate task so a full stdout pipe cannot deadlock us.
        let write_task = tokio::spawn(async move { stdin.write_all(text_owned.as_bytes()).await });

        let output = tokio::time::timeout(TTS_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Tts(format!(
                    "TTS process timed out after {} seconds",
                    TTS_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Tts(format!("Failed to wait for piper: {}", e)))?;

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::Tts(format!(
                    "Failed to write to piper stdin: {}",
                    e
                )))
            }
            Err(e) => return Err(VoiceError::Tts(format!("Stdin task failed: {}", e))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Tts(format!("Piper failed: {}", stderr)));
        }

        let mut pcm16le = output.stdout;
        if pcm16le.len() % 2 != 0 {
            tracing::warn!(bytes = pcm16le.len(), "piper produced a trailing half sample");
            pcm16le.pop();
        }

        Ok(SynthesizedAudio {
            pcm16le,
            sample_rate: self.sample_rate,
        })
    }
}

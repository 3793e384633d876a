use crate::error::VoiceError;
use crate::pipeline::{Transcriber, Transcript};
use async_trait::async_trait;
use callbridge_audio::pcm16le_to_samples;
use std::io::Cursor;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Maximum audio input size for STT (10 MiB). Prevents OOM from oversized payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// Timeout for STT process execution.
const STT_TIMEOUT: Duration = Duration::from_secs(120);

/// Transcriber backed by a whisper.cpp-compatible command line binary.
///
/// The utterance is wrapped in a WAV container and piped to the binary's
/// stdin; the transcript is read from stdout. whisper.cpp reports no
/// utterance-level confidence, so transcripts carry none.
#[derive(Debug, Clone)]
pub struct WhisperTranscriber {
    model_path: PathBuf,
    binary_path: PathBuf,
}

impl WhisperTranscriber {
    pub fn new(model_path: impl Into<PathBuf>, binary_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            binary_path: binary_path.into(),
        }
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, pcm16le: &[u8], sample_rate: u32) -> Result<Transcript, VoiceError> {
        if pcm16le.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Stt(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                pcm16le.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let mut command = Command::new(&self.binary_path);
        // -f - reads the WAV from stdin; -nt drops timestamps and -np drops
        // progress output so stdout holds only the text.
        command
            .arg("-m")
            .arg(&self.model_path)
            .arg("-f")
            .arg("-")
            .arg("-nt")
            .arg("-np")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| VoiceError::Stt(format!("Failed to spawn STT binary: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| VoiceError::Stt("Failed to open stdin".to_string()))?;

        let wav = wav_bytes(pcm16le, sample_rate)?;
        let write_task = tokio::spawn(async move { stdin.write_all(&wav).await });

        let output = tokio::time::timeout(STT_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| {
                VoiceError::Stt(format!(
                    "STT process timed out after {} seconds",
                    STT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(|e| VoiceError::Stt(format!("Failed to read stdout: {}", e)))?;

        match write_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                return Err(VoiceError::Stt(format!("Failed to write to stdin: {}", e)))
            }
            Err(e) => return Err(VoiceError::Stt(format!("Stdin task failed: {}", e))),
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VoiceError::Stt(format!("STT binary failed: {}", stderr)));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Transcript {
            text,
            confidence: None,
        })
    }
}

/// Wraps mono 16-bit little-endian PCM in a WAV container.
pub fn wav_bytes(pcm16le: &[u8], sample_rate: u32) -> Result<Vec<u8>, VoiceError> {
    let samples = pcm16le_to_samples(pcm16le)?;
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let wav_err = |e: hound::Error| VoiceError::Stt(format!("Failed to encode WAV: {}", e));
    let mut cursor = Cursor::new(Vec::with_capacity(44 + pcm16le.len()));
    let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(wav_err)?;
    for sample in samples {
        writer.write_sample(sample).map_err(wav_err)?;
    }
    writer.finalize().map_err(wav_err)?;
    Ok(cursor.into_inner())
}

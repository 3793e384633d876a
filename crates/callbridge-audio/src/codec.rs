//! Conversion between transport frames and pipeline samples.

use crate::error::AudioError;
use crate::resample::{resample, StreamResampler};
use serde::{Deserialize, Serialize};

/// Sample encoding used on the telephony socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// Linear 16-bit signed PCM, little-endian.
    #[default]
    L16,
    /// G.711 μ-law, one byte per sample.
    Mulaw,
}

/// Encoding plus sample rate of a mono audio stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: Encoding,
    pub sample_rate: u32,
}

impl AudioFormat {
    pub fn l16(sample_rate: u32) -> Self {
        Self {
            encoding: Encoding::L16,
            sample_rate,
        }
    }

    pub fn mulaw(sample_rate: u32) -> Self {
        Self {
            encoding: Encoding::Mulaw,
            sample_rate,
        }
    }

    pub fn bytes_per_sample(&self) -> usize {
        match self.encoding {
            Encoding::L16 => 2,
            Encoding::Mulaw => 1,
        }
    }

    /// MIME type announced to the provider when it connects the socket.
    pub fn content_type(&self) -> String {
        match self.encoding {
            Encoding::L16 => format!("audio/l16;rate={}", self.sample_rate),
            Encoding::Mulaw => format!("audio/pcmu;rate={}", self.sample_rate),
        }
    }

    /// Size in bytes of one transport frame of `frame_ms` milliseconds.
    pub fn frame_bytes(&self, frame_ms: u32) -> usize {
        (self.sample_rate as usize * frame_ms as usize / 1000) * self.bytes_per_sample()
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::l16(16_000)
    }
}

/// Converter between transport frames and pipeline samples.
///
/// Inbound audio goes through a [`FrameDecoder`], one per stream, which
/// decodes each frame and resamples it to `pipeline_rate`. Outbound audio
/// at any rate is resampled to the transport rate, encoded, and cut into
/// frames of `frame_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioCodec {
    transport: AudioFormat,
    pipeline_rate: u32,
    frame_ms: u32,
}

impl AudioCodec {
    pub fn new(transport: AudioFormat, pipeline_rate: u32, frame_ms: u32) -> Result<Self, AudioError> {
        if transport.sample_rate == 0 {
            return Err(AudioError::InvalidSampleRate(transport.sample_rate));
        }
        if pipeline_rate == 0 {
            return Err(AudioError::InvalidSampleRate(pipeline_rate));
        }
        if frame_ms == 0 || transport.frame_bytes(frame_ms) == 0 {
            return Err(AudioError::Config(format!(
                "frame of {} ms at {} Hz holds no samples",
                frame_ms, transport.sample_rate
            )));
        }
        Ok(Self {
            transport,
            pipeline_rate,
            frame_ms,
        })
    }

    pub fn transport(&self) -> AudioFormat {
        self.transport
    }

    pub fn pipeline_rate(&self) -> u32 {
        self.pipeline_rate
    }

    pub fn frame_ms(&self) -> u32 {
        self.frame_ms
    }

    /// Samples per transport frame.
    pub fn frame_samples(&self) -> usize {
        self.transport.frame_bytes(self.frame_ms) / self.transport.bytes_per_sample()
    }

    /// Decodes one transport frame into samples at the transport rate.
    pub fn decode(&self, frame: &[u8]) -> Result<Vec<i16>, AudioError> {
        match self.transport.encoding {
            Encoding::L16 => pcm16le_to_samples(frame),
            Encoding::Mulaw => Ok(frame.iter().map(|&b| mulaw_decode(b)).collect()),
        }
    }

    /// Starts decoding a new inbound stream.
    pub fn decoder(&self) -> Result<FrameDecoder, AudioError> {
        Ok(FrameDecoder {
            codec: *self,
            resampler: StreamResampler::new(
                self.transport.sample_rate,
                self.pipeline_rate,
                self.frame_samples(),
            )?,
        })
    }

    /// Encodes samples recorded at `sample_rate` into transport bytes.
    pub fn encode(&self, samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, AudioError> {
        let samples = resample(samples, sample_rate, self.transport.sample_rate)?;
        Ok(match self.transport.encoding {
            Encoding::L16 => samples_to_pcm16le(&samples),
            Encoding::Mulaw => samples.iter().map(|&s| mulaw_encode(s)).collect(),
        })
    }

    /// Encodes samples and splits them into whole transport frames.
    ///
    /// The provider expects every frame at the exact frame size, so the last
    /// frame is padded with encoded silence.
    pub fn frames(&self, samples: &[i16], sample_rate: u32) -> Result<Vec<Vec<u8>>, AudioError> {
        let encoded = self.encode(samples, sample_rate)?;
        let frame_bytes = self.transport.frame_bytes(self.frame_ms);
        let silence = match self.transport.encoding {
            Encoding::L16 => 0x00,
            Encoding::Mulaw => mulaw_encode(0),
        };

        Ok(encoded
            .chunks(frame_bytes)
            .map(|chunk| {
                let mut frame = chunk.to_vec();
                frame.resize(frame_bytes, silence);
                frame
            })
            .collect())
    }
}

/// Decoder for one inbound stream. Resampler state carries across frames,
/// so frame seams leave no trace in the decoded audio.
#[derive(Debug)]
pub struct FrameDecoder {
    codec: AudioCodec,
    resampler: StreamResampler,
}

impl FrameDecoder {
    /// Decodes one transport frame and returns the pipeline-rate samples it
    /// completes. Output may lag input by part of a frame.
    pub fn decode(&mut self, frame: &[u8]) -> Result<Vec<i16>, AudioError> {
        let samples = self.codec.decode(frame)?;
        self.resampler.push(&samples)
    }
}

/// Reinterprets little-endian 16-bit PCM bytes as samples.
pub fn pcm16le_to_samples(bytes: &[u8]) -> Result<Vec<i16>, AudioError> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::OddLength(bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

pub fn samples_to_pcm16le(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

const MULAW_BIAS: i32 = 0x84;
const MULAW_CLIP: i32 = 32_635;

/// Encodes one linear sample as G.711 μ-law.
pub fn mulaw_encode(sample: i16) -> u8 {
    let mut pcm = sample as i32;
    let sign = if pcm < 0 {
        pcm = -pcm;
        0x80
    } else {
        0x00
    };
    pcm = pcm.min(MULAW_CLIP) + MULAW_BIAS;

    let mut exponent: i32 = 7;
    let mut mask = 0x4000;
    while exponent > 0 && (pcm & mask) == 0 {
        exponent -= 1;
        mask >>= 1;
    }
    let mantissa = (pcm >> (exponent + 3)) & 0x0F;
    !((sign | (exponent << 4) | mantissa) as u8)
}

/// Decodes one G.711 μ-law byte to a linear sample.
pub fn mulaw_decode(byte: u8) -> i16 {
    let mu = !byte;
    let sign = mu & 0x80;
    let exponent = ((mu >> 4) & 0x07) as i32;
    let mantissa = (mu & 0x0F) as i32;
    let magnitude = (((mantissa << 3) + MULAW_BIAS) << exponent) - MULAW_BIAS;
    if sign != 0 {
        -magnitude as i16
    } else {
        magnitude as i16
    }
}

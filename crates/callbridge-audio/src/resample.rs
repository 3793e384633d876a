//! Sample-rate conversion.
//!
//! [`StreamResampler`] wraps a rubato FFT resampler and keeps its filter
//! state between pushes, so a stream resampled frame by frame comes out
//! identical to the same stream resampled in one piece.

use crate::error::AudioError;
use rubato::{FftFixedIn, Resampler};

const SUB_CHUNKS: usize = 2;

/// Chunk size used by [`resample`] for whole buffers.
const BATCH_CHUNK: usize = 1024;

fn to_f32(sample: i16) -> f32 {
    sample as f32 / 32_768.0
}

fn to_i16(sample: f32) -> i16 {
    (sample * 32_768.0).round().clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Resampler for one continuous mono stream.
///
/// Input is buffered until the resampler has a whole chunk. The filter
/// delay is trimmed from the front of the output, so output sample `n`
/// lines up with input time `n / to_rate`.
pub struct StreamResampler {
    /// `None` when the rates match and samples pass through.
    inner: Option<FftFixedIn<f32>>,
    from_rate: u32,
    to_rate: u32,
    pending: Vec<f32>,
    skip: usize,
    total_in: u64,
    total_out: u64,
}

impl std::fmt::Debug for StreamResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResampler")
            .field("from_rate", &self.from_rate)
            .field("to_rate", &self.to_rate)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl StreamResampler {
    /// `chunk_size` is the preferred number of input samples per resampler
    /// call; a transport frame is a good fit for live streams.
    pub fn new(from_rate: u32, to_rate: u32, chunk_size: usize) -> Result<Self, AudioError> {
        if from_rate == 0 {
            return Err(AudioError::InvalidSampleRate(from_rate));
        }
        if to_rate == 0 {
            return Err(AudioError::InvalidSampleRate(to_rate));
        }

        let (inner, skip) = if from_rate == to_rate {
            (None, 0)
        } else {
            let resampler = FftFixedIn::<f32>::new(
                from_rate as usize,
                to_rate as usize,
                chunk_size.max(1),
                SUB_CHUNKS,
                1,
            )
            .map_err(|e| AudioError::Resample(e.to_string()))?;
            let delay = resampler.output_delay();
            (Some(resampler), delay)
        };

        Ok(Self {
            inner,
            from_rate,
            to_rate,
            pending: Vec::new(),
            skip,
            total_in: 0,
            total_out: 0,
        })
    }

    pub fn from_rate(&self) -> u32 {
        self.from_rate
    }

    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    /// Feeds samples and returns whatever output is ready.
    pub fn push(&mut self, samples: &[i16]) -> Result<Vec<i16>, AudioError> {
        self.total_in += samples.len() as u64;
        let Some(inner) = self.inner.as_mut() else {
            self.total_out += samples.len() as u64;
            return Ok(samples.to_vec());
        };

        self.pending.extend(samples.iter().map(|&s| to_f32(s)));

        let mut out = Vec::new();
        loop {
            let need = inner.input_frames_next();
            if self.pending.len() < need {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..need).collect();
            let produced = inner
                .process(std::slice::from_ref(&chunk), None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            emit(&mut self.skip, &produced[0], &mut out);
        }
        self.total_out += out.len() as u64;
        Ok(out)
    }

    /// Ends the stream and returns the remaining output. Across all calls
    /// the stream yields exactly `total_in * to_rate / from_rate` samples.
    pub fn finish(mut self) -> Result<Vec<i16>, AudioError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(Vec::new());
        };

        let target = self.total_in * self.to_rate as u64 / self.from_rate as u64;
        let remaining = target.saturating_sub(self.total_out) as usize;
        let mut out = Vec::new();

        let rest = std::mem::take(&mut self.pending);
        let produced = inner
            .process_partial(Some(std::slice::from_ref(&rest)), None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;
        emit(&mut self.skip, &produced[0], &mut out);

        // Drain the filter delay with silence.
        let mut rounds = 0;
        while out.len() < remaining && rounds < 16 {
            let produced = inner
                .process_partial(None::<&[Vec<f32>]>, None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            emit(&mut self.skip, &produced[0], &mut out);
            rounds += 1;
        }

        out.truncate(remaining);
        Ok(out)
    }
}

fn emit(skip: &mut usize, produced: &[f32], out: &mut Vec<i16>) {
    let dropped = (*skip).min(produced.len());
    *skip -= dropped;
    out.extend(produced[dropped..].iter().map(|&s| to_i16(s)));
}

/// Resamples a whole buffer. Returns the input unchanged when the rates
/// match.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Result<Vec<i16>, AudioError> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }
    let mut resampler = StreamResampler::new(from_rate, to_rate, BATCH_CHUNK.min(samples.len()))?;
    let mut out = resampler.push(samples)?;
    out.extend(resampler.finish()?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(len: usize) -> Vec<i16> {
        (0..len).map(|i| (i as i16) * 5).collect()
    }

    fn tone(len: usize, rate: u32) -> Vec<i16> {
        (0..len)
            .map(|i| {
                let t = i as f32 / rate as f32;
                (8_000.0 * (2.0 * std::f32::consts::PI * 300.0 * t).sin()) as i16
            })
            .collect()
    }

    #[test]
    fn frame_by_frame_matches_whole_stream() {
        let input = ramp(320);

        let mut whole = StreamResampler::new(8_000, 16_000, 160).unwrap();
        let mut expected = whole.push(&input).unwrap();
        expected.extend(whole.finish().unwrap());

        let mut split = StreamResampler::new(8_000, 16_000, 160).unwrap();
        let mut got = split.push(&input[..160]).unwrap();
        got.extend(split.push(&input[160..]).unwrap());
        got.extend(split.finish().unwrap());

        assert_eq!(got, expected);
        assert_eq!(got.len(), 640);
    }

    #[test]
    fn uneven_ratio_keeps_every_sample() {
        // 20 ms frames at 11.025 kHz do not divide into whole 16 kHz frames.
        let input = tone(220 * 50, 11_025);
        let mut resampler = StreamResampler::new(11_025, 16_000, 220).unwrap();

        let mut out = Vec::new();
        for frame in input.chunks(220) {
            out.extend(resampler.push(frame).unwrap());
        }
        out.extend(resampler.finish().unwrap());

        assert_eq!(out.len(), 220 * 50 * 16_000 / 11_025);

        let mut whole = StreamResampler::new(11_025, 16_000, 220).unwrap();
        let mut expected = whole.push(&input).unwrap();
        expected.extend(whole.finish().unwrap());
        assert_eq!(out, expected);
    }

    #[test]
    fn downsampled_tone_keeps_its_level() {
        let input = tone(22_050, 22_050);
        let out = resample(&input, 22_050, 16_000).unwrap();
        assert_eq!(out.len(), 16_000);

        let peak = out[1_000..15_000].iter().map(|s| s.unsigned_abs()).max().unwrap();
        assert!((7_500..=8_500).contains(&peak), "peak {}", peak);
    }

    #[test]
    fn matching_rates_pass_through() {
        let input = ramp(100);
        let mut resampler = StreamResampler::new(16_000, 16_000, 320).unwrap();
        assert_eq!(resampler.push(&input).unwrap(), input);
        assert!(resampler.finish().unwrap().is_empty());
        assert_eq!(resample(&input, 16_000, 16_000).unwrap(), input);
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert_eq!(
            StreamResampler::new(0, 16_000, 160).err(),
            Some(AudioError::InvalidSampleRate(0))
        );
    }
}

//! Sample-rate and channel conversion from a decoder's native stream format
//! to the engine's configured target format.
//!
//! Per the file-source contract, the decoder thread must deliver audio
//! "already converted to the target format" before it ever reaches the
//! ring buffer or a time-stretch stage. Grounded on
//! `wkmp-ap/src/audio/resampler.rs`'s `StatefulResampler` (one rubato
//! instance reused across chunks so filter state carries over and chunk
//! boundaries don't introduce phase discontinuities), generalized here
//! with a channel remap step ahead of the rate conversion since this core
//! targets 1-8 channels rather than the teacher's fixed stereo output.

use crate::error::{DecodeError, Error, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};

/// Converts interleaved `f32` audio at a decoder's native rate/channel
/// count into the engine's target rate/channel count. Stateful: reuse one
/// instance across an entire decode so the resampler's internal filter
/// history carries across packet boundaries.
pub enum StreamConverter {
    /// Native format already matches the target rate; channel remap (if
    /// any) is the only transform applied.
    PassThrough { in_channels: u16, out_channels: u16 },
    Active {
        resampler: FastFixedIn<f32>,
        in_channels: u16,
        out_channels: u16,
    },
}

impl StreamConverter {
    pub fn new(
        in_rate: u32,
        out_rate: u32,
        in_channels: u16,
        out_channels: u16,
        chunk_size_frames: usize,
    ) -> Result<Self> {
        if in_rate == out_rate {
            return Ok(Self::PassThrough {
                in_channels,
                out_channels,
            });
        }

        let resampler = FastFixedIn::<f32>::new(
            out_rate as f64 / in_rate as f64,
            1.0,
            PolynomialDegree::Septic,
            chunk_size_frames.max(1),
            out_channels as usize,
        )
        .map_err(|e| {
            Error::Decode(DecodeError::ResamplingError {
                reason: e.to_string(),
            })
        })?;

        Ok(Self::Active {
            resampler,
            in_channels,
            out_channels,
        })
    }

    /// Convert one chunk of interleaved, native-format samples into the
    /// target format. `input`'s frame count need not match the chunk size
    /// the converter was constructed with — the final, shorter chunk at
    /// end-of-stream is handled by rubato's partial-processing path.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        match self {
            Self::PassThrough {
                in_channels,
                out_channels,
            } => Ok(remap_channels(input, *in_channels, *out_channels)),
            Self::Active {
                resampler,
                in_channels,
                out_channels,
            } => {
                let remapped = remap_channels(input, *in_channels, *out_channels);
                let planar = deinterleave(&remapped, *out_channels);
                let output = resampler
                    .process_partial(Some(&planar), None)
                    .map_err(|e| {
                        Error::Decode(DecodeError::ResamplingError {
                            reason: e.to_string(),
                        })
                    })?;
                Ok(interleave(output))
            }
        }
    }
}

/// Remap interleaved audio from `in_channels` to `out_channels`: mono
/// broadcasts to every output channel, any-channel-count downmixes to
/// mono by averaging, and otherwise channels are copied positionally and
/// padded with silence (fewer input channels than output) or truncated
/// (more input channels than output).
pub fn remap_channels(input: &[f32], in_channels: u16, out_channels: u16) -> Vec<f32> {
    if in_channels == out_channels || in_channels == 0 {
        return input.to_vec();
    }
    let in_c = in_channels as usize;
    let out_c = out_channels as usize;
    let frames = input.len() / in_c;
    let mut out = Vec::with_capacity(frames * out_c);

    for frame in input.chunks_exact(in_c) {
        if in_c == 1 {
            for _ in 0..out_c {
                out.push(frame[0]);
            }
        } else if out_c == 1 {
            out.push(frame.iter().sum::<f32>() / in_c as f32);
        } else {
            for c in 0..out_c {
                out.push(frame.get(c).copied().unwrap_or(0.0));
            }
        }
    }
    out
}

fn deinterleave(samples: &[f32], channels: u16) -> Vec<Vec<f32>> {
    let num_channels = channels as usize;
    let num_frames = samples.len() / num_channels.max(1);
    let mut planar = vec![Vec::with_capacity(num_frames); num_channels];
    for frame in samples.chunks_exact(num_channels) {
        for (c, sample) in frame.iter().enumerate() {
            planar[c].push(*sample);
        }
    }
    planar
}

fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
    if planar.is_empty() {
        return Vec::new();
    }
    let num_channels = planar.len();
    let num_frames = planar[0].len();
    let mut interleaved = Vec::with_capacity(num_frames * num_channels);
    for frame_idx in 0..num_frames {
        for channel in &planar {
            interleaved.push(channel[frame_idx]);
        }
    }
    interleaved
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_broadcasts_to_stereo() {
        let mono = vec![0.5, -0.25, 1.0];
        let stereo = remap_channels(&mono, 1, 2);
        assert_eq!(stereo, vec![0.5, 0.5, -0.25, -0.25, 1.0, 1.0]);
    }

    #[test]
    fn stereo_downmixes_to_mono() {
        let stereo = vec![1.0, -1.0, 0.5, 0.5];
        let mono = remap_channels(&stereo, 2, 1);
        assert_eq!(mono, vec![0.0, 0.5]);
    }

    #[test]
    fn same_channel_count_is_a_copy() {
        let samples = vec![0.1, 0.2, 0.3, 0.4];
        assert_eq!(remap_channels(&samples, 2, 2), samples);
    }

    #[test]
    fn pass_through_at_matching_rate_only_remaps_channels() {
        let mut converter = StreamConverter::new(44_100, 44_100, 1, 2, 512).unwrap();
        let mono = vec![1.0, 0.5];
        let stereo = converter.process(&mono).unwrap();
        assert_eq!(stereo, vec![1.0, 1.0, 0.5, 0.5]);
    }

    #[test]
    fn deinterleave_interleave_roundtrip() {
        let samples = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let planar = deinterleave(&samples, 2);
        assert_eq!(interleave(planar), samples);
    }
}

//! `IAudioDecoder` contract and a `symphonia`-backed implementation.
//!
//! Unlike a decode-entire-file-then-trim strategy, the decoder thread here
//! drives `read_frames` incrementally, one packet's worth of samples at a
//! time, so a source's ring buffer can be kept topped up without first
//! materializing an entire file in memory.

use crate::error::{DecodeError, Error, Result};
use audiocore_common::AudioConfig;
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, warn};

/// Stream metadata a decoder exposes once opened.
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub channels: u16,
    pub sample_rate: u32,
    pub duration_seconds: f64,
}

/// A decoder producing interleaved `f32` PCM, abstracted so the engine does
/// not depend directly on any one decoding library at the trait boundary.
pub trait IAudioDecoder: Send {
    fn stream_info(&self) -> StreamInfo;

    /// Decode into `buf`, writing interleaved samples. Returns the number of
    /// *frames* written (0 on EOF) and whether end-of-stream was reached.
    fn read_frames(&mut self, buf: &mut Vec<f32>, max_frames: usize) -> Result<(usize, bool)>;

    fn try_seek(&mut self, position_seconds: f64) -> Result<()>;
}

/// `symphonia`-backed decoder. Resampling to a target sample rate and
/// channel layout is a separate stage (the source owns a `rubato`
/// resampler); this type only reports the source file's native format.
pub struct SymphoniaDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    info: StreamInfo,
}

impl SymphoniaDecoder {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            Error::Decode(DecodeError::FileNotFound {
                path: format!("{}: {}", path.display(), e),
            })
        })?;

        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|_| Error::Decode(DecodeError::ProbeFailure))?;

        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(Error::Decode(DecodeError::NoAudioTracks))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();

        let sample_rate = codec_params
            .sample_rate
            .ok_or(Error::Decode(DecodeError::ProbeFailure))?;
        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or(Error::Decode(DecodeError::ProbeFailure))?;
        let duration_seconds = codec_params
            .n_frames
            .map(|n| n as f64 / sample_rate as f64)
            .unwrap_or(0.0);

        let decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| {
                Error::Decode(DecodeError::UnsupportedFormat {
                    format: e.to_string(),
                })
            })?;

        debug!(sample_rate, channels, "opened audio decoder");

        Ok(Self {
            format,
            decoder,
            track_id,
            info: StreamInfo {
                channels,
                sample_rate,
                duration_seconds,
            },
        })
    }

    fn convert_to_f32(decoded: &AudioBufferRef, out: &mut Vec<f32>) {
        match decoded {
            AudioBufferRef::F32(buf) => {
                let planes = buf.planes();
                let chans = planes.planes();
                let frames = buf.frames();
                for i in 0..frames {
                    for plane in chans {
                        out.push(plane[i]);
                    }
                }
            }
            AudioBufferRef::S32(buf) => {
                let planes = buf.planes();
                let chans = planes.planes();
                let frames = buf.frames();
                for i in 0..frames {
                    for plane in chans {
                        out.push(plane[i] as f32 / i32::MAX as f32);
                    }
                }
            }
            AudioBufferRef::S16(buf) => {
                let planes = buf.planes();
                let chans = planes.planes();
                let frames = buf.frames();
                for i in 0..frames {
                    for plane in chans {
                        out.push(plane[i] as f32 / i16::MAX as f32);
                    }
                }
            }
            _ => {
                warn!("unsupported sample format, emitting silence for this packet");
            }
        }
    }
}

impl IAudioDecoder for SymphoniaDecoder {
    fn stream_info(&self) -> StreamInfo {
        self.info
    }

    fn read_frames(&mut self, buf: &mut Vec<f32>, max_frames: usize) -> Result<(usize, bool)> {
        let start_len = buf.len();
        let target_len = start_len + max_frames * self.info.channels as usize;

        loop {
            if buf.len() >= target_len {
                break;
            }

            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    let frames_written = (buf.len() - start_len) / self.info.channels as usize;
                    return Ok((frames_written, true));
                }
                Err(e) => {
                    warn!(error = %e, "error reading packet");
                    let frames_written = (buf.len() - start_len) / self.info.channels as usize;
                    return Ok((frames_written, true));
                }
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.decoder.decode(&packet) {
                Ok(decoded) => Self::convert_to_f32(&decoded, buf),
                Err(e) => {
                    warn!(error = %e, "decode error on packet, skipping");
                    continue;
                }
            }
        }

        let frames_written = (buf.len() - start_len) / self.info.channels as usize;
        Ok((frames_written, false))
    }

    fn try_seek(&mut self, position_seconds: f64) -> Result<()> {
        let time = Time::from(position_seconds);
        self.format
            .seek(
                symphonia::core::formats::SeekMode::Accurate,
                symphonia::core::formats::SeekTo::Time {
                    time,
                    track_id: Some(self.track_id),
                },
            )
            .map_err(|_| {
                Error::Decode(DecodeError::SeekFailed {
                    position: (position_seconds * self.info.sample_rate as f64) as u64,
                })
            })?;
        Ok(())
    }
}

/// Builds the `AudioConfig` a resampler/mixer target should use, given the
/// decoder's native stream info and the engine's configured sample rate.
pub fn target_config(engine_config: &AudioConfig, _stream: &StreamInfo) -> AudioConfig {
    engine_config.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_info_is_copy() {
        let info = StreamInfo {
            channels: 2,
            sample_rate: 44_100,
            duration_seconds: 10.0,
        };
        let info2 = info;
        assert_eq!(info.channels, info2.channels);
    }
}

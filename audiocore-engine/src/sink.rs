//! Platform audio sink (cpal-backed).
//!
//! Grounded directly on the teacher's `AudioOutput`: same device-selection
//! strategy (`list_devices`, prefer the engine's configured rate/channels in
//! f32, fall back to the device's own default config) and the same
//! `build_output_stream` + per-sample-format callback shape. The callback
//! itself is rebuilt around this crate's ring buffer instead of the
//! teacher's `FnMut() -> AudioFrame` closure, since here the mixer pump
//! (not the platform thread) decides when samples are produced — the
//! platform callback only drains what's already mixed.

use crate::error::{DeviceError, Error, Result};
use crate::ring_buffer::RingConsumer;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Drives a platform output device from a [`RingConsumer`] fed by the mixer.
pub struct CpalSink {
    device: Device,
    config: StreamConfig,
    sample_format: SampleFormat,
    stream: Option<Stream>,
}

impl CpalSink {
    /// List available output device names.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices: Vec<String> = host
            .output_devices()
            .map_err(|e| DeviceError::StreamOpenFailed {
                reason: format!("failed to enumerate devices: {e}"),
            })?
            .filter_map(|device| device.name().ok())
            .collect();
        debug!(count = devices.len(), "enumerated output devices");
        Ok(devices)
    }

    /// Open a device (by name, or the host default) and negotiate a stream
    /// configuration matching `sample_rate`/`channels` in f32 if supported.
    pub fn open(device_name: Option<&str>, sample_rate: u32, channels: u16) -> Result<Self> {
        let host = cpal::default_host();

        let device = if let Some(name) = device_name {
            let mut devices = host
                .output_devices()
                .map_err(|e| DeviceError::StreamOpenFailed {
                    reason: format!("failed to enumerate devices: {e}"),
                })?;
            devices
                .find(|d| d.name().ok().as_deref() == Some(name))
                .ok_or(DeviceError::NoDevice)?
        } else {
            host.default_output_device().ok_or(DeviceError::NoDevice)?
        };

        let found_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        info!(device = %found_name, "opened audio output device");

        let (config, sample_format) = Self::get_best_config(&device, sample_rate, channels)?;
        debug!(
            sample_rate = config.sample_rate.0,
            channels = config.channels,
            ?sample_format,
            "negotiated output stream config"
        );

        Ok(Self {
            device,
            config,
            sample_format,
            stream: None,
        })
    }

    /// Prefer an exact match on `sample_rate`/`channels` in f32; otherwise
    /// fall back to the device's own default config, as the teacher does.
    fn get_best_config(
        device: &Device,
        sample_rate: u32,
        channels: u16,
    ) -> Result<(StreamConfig, SampleFormat)> {
        let mut supported = device
            .supported_output_configs()
            .map_err(|e| DeviceError::UnsupportedConfig {
                reason: format!("failed to query device configs: {e}"),
            })?;

        let preferred = supported.find(|c| {
            c.channels() == channels
                && c.min_sample_rate().0 <= sample_rate
                && c.max_sample_rate().0 >= sample_rate
                && (c.sample_format() == SampleFormat::F32 || c.sample_format() == SampleFormat::I16)
        });

        if let Some(supported_config) = preferred {
            let sample_format = supported_config.sample_format();
            let config = supported_config
                .with_sample_rate(cpal::SampleRate(sample_rate))
                .config();
            return Ok((config, sample_format));
        }

        let default_config = device
            .default_output_config()
            .map_err(|e| DeviceError::UnsupportedConfig {
                reason: format!("failed to get default output config: {e}"),
            })?;
        Ok((default_config.config(), default_config.sample_format()))
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    pub fn channels(&self) -> u16 {
        self.config.channels
    }

    /// Start the device callback draining `consumer`. Missing samples
    /// (consumer underrun) are filled with silence, matching the sink
    /// contract's zero-fill-and-count-as-underrun rule.
    pub fn start(&mut self, consumer: Arc<Mutex<RingConsumer>>) -> Result<()> {
        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream_f32(consumer),
            SampleFormat::I16 => self.build_stream_i16(consumer),
            other => {
                return Err(Error::Device(DeviceError::UnsupportedConfig {
                    reason: format!("unsupported output sample format: {other:?}"),
                }))
            }
        }?;

        stream.play().map_err(|e| DeviceError::StreamOpenFailed {
            reason: format!("failed to start stream: {e}"),
        })?;
        self.stream = Some(stream);
        info!("audio output stream started");
        Ok(())
    }

    fn build_stream_f32(&self, consumer: Arc<Mutex<RingConsumer>>) -> Result<Stream> {
        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let read = consumer.lock().read(data);
                    if read < data.len() {
                        data[read..].iter_mut().for_each(|s| *s = 0.0);
                    }
                },
                move |err| warn!("audio output stream error: {err}"),
                None,
            )
            .map_err(|e| {
                Error::Device(DeviceError::StreamOpenFailed {
                    reason: format!("failed to build f32 stream: {e}"),
                })
            })
    }

    fn build_stream_i16(&self, consumer: Arc<Mutex<RingConsumer>>) -> Result<Stream> {
        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    let mut scratch = vec![0.0f32; data.len()];
                    consumer.lock().read(&mut scratch);
                    for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
                    }
                },
                move |err| warn!("audio output stream error: {err}"),
                None,
            )
            .map_err(|e| {
                Error::Device(DeviceError::StreamOpenFailed {
                    reason: format!("failed to build i16 stream: {e}"),
                })
            })
    }

    pub fn stop(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.take() {
            stream.pause().map_err(|e| DeviceError::StreamOpenFailed {
                reason: format!("failed to pause stream: {e}"),
            })?;
        }
        Ok(())
    }
}

impl Drop for CpalSink {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_devices_does_not_panic() {
        let result = CpalSink::list_devices();
        assert!(result.is_ok() || result.is_err());
    }
}

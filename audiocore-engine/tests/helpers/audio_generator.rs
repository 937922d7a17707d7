//! Deterministic WAV fixture generation for pipeline tests, adapted from
//! the teacher's own `tests/helpers/audio_generator.rs`.

use std::path::Path;

/// Generate a stereo WAV file holding a constant sample value, at the given
/// sample rate, for `duration_ms`. Used to drive a real [`FileSource`]
/// decode through the mixer without hand-authoring binary fixtures.
pub fn generate_constant_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    duration_ms: u64,
    value: f32,
) -> Result<(), hound::Error> {
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    let total_frames = (sample_rate as u64 * duration_ms) / 1000;
    let sample_i16 = (value.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
    for _ in 0..total_frames {
        writer.write_sample(sample_i16)?;
        writer.write_sample(sample_i16)?;
    }
    writer.finalize()
}

/// Generate a silent stereo WAV file of `duration_ms`.
pub fn generate_silent_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    duration_ms: u64,
) -> Result<(), hound::Error> {
    generate_constant_wav(path, sample_rate, duration_ms, 0.0)
}

//! Test helper modules for audiocore-engine integration tests.

pub mod audio_generator;
pub mod constant_source;

pub use audio_generator::generate_silent_wav;
pub use constant_source::ConstantSource;

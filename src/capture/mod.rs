//! Audio capture to MP3/WAV files
//!
//! 1. An `AudioInput` pushes fixed-size sample blocks into a bounded queue
//! 2. The `fm-capture` thread encodes them (`AudioEncoder`)
//! 3. Files are named from the configured pattern, never overwriting

pub mod encoder;
pub mod input;
pub mod naming;
pub mod pipeline;
pub mod tags;

#[cfg(feature = "cpal-audio")]
pub mod cpal_input;

pub use encoder::{open_encoder, AudioEncoder, WavEncoder};
pub use input::{AudioFormat, AudioInput, BlockSink, CaptureStats, UnavailableInput};
pub use pipeline::{CapturePipeline, CaptureStatus, RecordingSummary};
pub use tags::{write_tags, RecordingTags};

#[cfg(feature = "cpal-audio")]
pub use cpal_input::CpalInput;

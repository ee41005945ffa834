//! Sound card input using CPAL

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info};

use crate::error::CaptureError;

use super::input::{AudioFormat, AudioInput, BlockSink};

fn device_failure(context: &str, err: impl std::fmt::Display) -> CaptureError {
    CaptureError::CaptureDeviceFailure(format!("{}: {}", context, err))
}

/// Wrapper for cpal::Stream to make it Send.
///
/// SAFETY: the stream is created, paused and dropped only by the thread that
/// owns the capture pipeline; it never crosses threads while alive.
struct SendableStream(cpal::Stream);

unsafe impl Send for SendableStream {}

/// Cuts the callback's variable-size buffers into fixed blocks
fn block_writer<T, F>(
    sink: BlockSink,
    block_len: usize,
    convert: F,
) -> impl FnMut(&[T], &cpal::InputCallbackInfo) + Send + 'static
where
    T: Copy,
    F: Fn(T) -> i16 + Send + 'static,
{
    let mut pending: Vec<i16> = Vec::with_capacity(block_len);
    move |data: &[T], _: &cpal::InputCallbackInfo| {
        for &sample in data {
            pending.push(convert(sample));
            if pending.len() == block_len {
                sink.push(std::mem::replace(&mut pending, Vec::with_capacity(block_len)));
            }
        }
    }
}

fn error_reporter(sink: BlockSink) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| {
        error!("Audio stream error: {}", err);
        sink.fail(err.to_string());
    }
}

/// Capture from a named input device, or the host default
pub struct CpalInput {
    device: cpal::Device,
    device_name: String,
    stream: Option<SendableStream>,
}

impl CpalInput {
    pub fn new(device_name: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| device_failure("Failed to enumerate input devices", e))?
                .find(|dev| dev.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| {
                    CaptureError::CaptureDeviceFailure(format!("Input device not found: {}", name))
                })?,
            None => host.default_input_device().ok_or_else(|| {
                CaptureError::CaptureDeviceFailure("No default input device".to_string())
            })?,
        };
        let device_name = device.name().unwrap_or_else(|_| "unknown".to_string());
        info!("Audio input device: {}", device_name);

        Ok(Self {
            device,
            device_name,
            stream: None,
        })
    }
}

impl AudioInput for CpalInput {
    fn start(&mut self, format: &AudioFormat, sink: BlockSink) -> Result<(), CaptureError> {
        let config = cpal::StreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let block_len = format.block_len();

        // i16 first; devices exposing only float formats get converted
        let stream = match self.device.build_input_stream(
            &config,
            block_writer(sink.clone(), block_len, |s: i16| s),
            error_reporter(sink.clone()),
            None,
        ) {
            Ok(stream) => stream,
            Err(e) => {
                debug!("i16 input stream unavailable ({}), trying f32", e);
                self.device
                    .build_input_stream(
                        &config,
                        block_writer(sink.clone(), block_len, |s: f32| {
                            (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
                        }),
                        error_reporter(sink),
                        None,
                    )
                    .map_err(|e| device_failure("Failed to build input stream", e))?
            }
        };

        stream
            .play()
            .map_err(|e| device_failure("Failed to start input stream", e))?;
        self.stream = Some(SendableStream(stream));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.0.pause() {
                debug!("Pausing input stream failed: {}", e);
            }
        }
    }

    fn name(&self) -> String {
        self.device_name.clone()
    }
}

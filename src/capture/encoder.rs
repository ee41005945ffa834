//! Block encoders writing to the recording file

use std::fs::File;
use std::io::{BufWriter, Write};

use crate::config::Encoding;
use crate::error::CaptureError;

use super::input::AudioFormat;

fn io_failure(context: &str, err: impl std::fmt::Display) -> CaptureError {
    CaptureError::CaptureDeviceFailure(format!("{}: {}", context, err))
}

/// Encodes PCM blocks into an open output file
pub trait AudioEncoder {
    fn write_block(&mut self, samples: &[i16]) -> Result<(), CaptureError>;

    /// Flush trailing frames, finalize headers and sync the file to disk
    fn finish(self: Box<Self>) -> Result<(), CaptureError>;
}

impl Encoding {
    pub fn extension(self) -> &'static str {
        match self {
            Encoding::Mp3 => "mp3",
            Encoding::Wav => "wav",
        }
    }
}

/// Build the encoder for `encoding` around a freshly created file
pub fn open_encoder(
    encoding: Encoding,
    file: File,
    format: &AudioFormat,
    bitrate_kbps: u32,
) -> Result<Box<dyn AudioEncoder>, CaptureError> {
    match encoding {
        Encoding::Wav => Ok(Box::new(WavEncoder::new(file, format)?)),
        #[cfg(feature = "mp3")]
        Encoding::Mp3 => Ok(Box::new(mp3::Mp3Encoder::new(file, format, bitrate_kbps)?)),
        #[cfg(not(feature = "mp3"))]
        Encoding::Mp3 => {
            let _ = (file, bitrate_kbps);
            Err(CaptureError::CaptureDeviceFailure(
                "MP3 encoding not available (built without the `mp3` feature)".to_string(),
            ))
        }
    }
}

/// 16-bit PCM WAV via hound
pub struct WavEncoder {
    writer: hound::WavWriter<BufWriter<File>>,
    /// Second handle to the same file, for the final fsync
    sync_handle: File,
}

impl WavEncoder {
    pub fn new(file: File, format: &AudioFormat) -> Result<Self, CaptureError> {
        let sync_handle = file
            .try_clone()
            .map_err(|e| io_failure("Failed to clone file handle", e))?;
        let spec = hound::WavSpec {
            channels: format.channels,
            sample_rate: format.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::new(BufWriter::new(file), spec)
            .map_err(|e| io_failure("Failed to write WAV header", e))?;
        Ok(Self { writer, sync_handle })
    }
}

impl AudioEncoder for WavEncoder {
    fn write_block(&mut self, samples: &[i16]) -> Result<(), CaptureError> {
        for &sample in samples {
            self.writer
                .write_sample(sample)
                .map_err(|e| io_failure("Failed to write WAV samples", e))?;
        }
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<(), CaptureError> {
        let Self { writer, sync_handle } = *self;
        writer
            .finalize()
            .map_err(|e| io_failure("Failed to finalize WAV file", e))?;
        sync_handle
            .sync_all()
            .map_err(|e| io_failure("Failed to sync recording", e))
    }
}

#[cfg(feature = "mp3")]
mod mp3 {
    use super::*;
    use mp3lame_encoder::{max_required_buffer_size, Bitrate, Builder, FlushNoGap, InterleavedPcm, MonoPcm, Quality};

    /// Room LAME needs for a flush
    const FLUSH_BUFFER: usize = 7200;

    fn bitrate(kbps: u32) -> Bitrate {
        match kbps {
            0..=64 => Bitrate::Kbps64,
            65..=96 => Bitrate::Kbps96,
            97..=128 => Bitrate::Kbps128,
            129..=160 => Bitrate::Kbps160,
            161..=192 => Bitrate::Kbps192,
            193..=256 => Bitrate::Kbps256,
            _ => Bitrate::Kbps320,
        }
    }

    /// CBR MP3 via LAME
    pub struct Mp3Encoder {
        encoder: mp3lame_encoder::Encoder,
        writer: BufWriter<File>,
        channels: u16,
        buffer: Vec<u8>,
    }

    impl Mp3Encoder {
        pub fn new(file: File, format: &AudioFormat, bitrate_kbps: u32) -> Result<Self, CaptureError> {
            let mut builder = Builder::new().ok_or_else(|| {
                CaptureError::CaptureDeviceFailure("Failed to create LAME encoder".to_string())
            })?;
            builder
                .set_num_channels(format.channels as u8)
                .map_err(|e| io_failure("Failed to set channels", format!("{:?}", e)))?;
            builder
                .set_sample_rate(format.sample_rate)
                .map_err(|e| io_failure("Failed to set sample rate", format!("{:?}", e)))?;
            builder
                .set_brate(bitrate(bitrate_kbps))
                .map_err(|e| io_failure("Failed to set bitrate", format!("{:?}", e)))?;
            builder
                .set_quality(Quality::Good)
                .map_err(|e| io_failure("Failed to set quality", format!("{:?}", e)))?;
            let encoder = builder
                .build()
                .map_err(|e| io_failure("Failed to build encoder", format!("{:?}", e)))?;

            Ok(Self {
                encoder,
                writer: BufWriter::new(file),
                channels: format.channels,
                buffer: Vec::new(),
            })
        }
    }

    impl AudioEncoder for Mp3Encoder {
        fn write_block(&mut self, samples: &[i16]) -> Result<(), CaptureError> {
            self.buffer.clear();
            self.buffer.reserve(max_required_buffer_size(samples.len()));
            let encoded = if self.channels == 1 {
                self.encoder.encode_to_vec(MonoPcm(samples), &mut self.buffer)
            } else {
                self.encoder.encode_to_vec(InterleavedPcm(samples), &mut self.buffer)
            };
            encoded.map_err(|e| io_failure("Encoding failed", format!("{:?}", e)))?;
            self.writer
                .write_all(&self.buffer)
                .map_err(|e| io_failure("Failed to write MP3 data", e))
        }

        fn finish(self: Box<Self>) -> Result<(), CaptureError> {
            let Self { mut encoder, mut writer, mut buffer, .. } = *self;
            buffer.clear();
            buffer.reserve(FLUSH_BUFFER);
            encoder
                .flush_to_vec::<FlushNoGap>(&mut buffer)
                .map_err(|e| io_failure("Failed to flush encoder", format!("{:?}", e)))?;
            writer
                .write_all(&buffer)
                .map_err(|e| io_failure("Failed to write final MP3 data", e))?;
            let file = writer
                .into_inner()
                .map_err(|e| io_failure("Failed to flush MP3 file", e.error()))?;
            file.sync_all()
                .map_err(|e| io_failure("Failed to sync recording", e))
        }
    }
}

#[cfg(feature = "mp3")]
pub use mp3::Mp3Encoder;

#[cfg(test)]
mod tests {
    use super::*;

    fn format(channels: u16) -> AudioFormat {
        AudioFormat {
            sample_rate: 44_100,
            channels,
            block_frames: 1024,
        }
    }

    #[test]
    fn test_wav_encoder_writes_all_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wav");
        let file = File::create(&path).unwrap();

        let mut encoder = open_encoder(Encoding::Wav, file, &format(2), 128).unwrap();
        let block: Vec<i16> = (0..2048).map(|i| (i % 512) as i16).collect();
        for _ in 0..3 {
            encoder.write_block(&block).unwrap();
        }
        encoder.finish().unwrap();

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 44_100);
        assert_eq!(reader.duration(), 3 * 1024);
    }

    #[cfg(feature = "mp3")]
    #[test]
    fn test_mp3_encoder_produces_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.mp3");
        let file = File::create(&path).unwrap();

        let mut encoder = open_encoder(Encoding::Mp3, file, &format(1), 128).unwrap();
        let block: Vec<i16> = (0..1024)
            .map(|i| ((i as f32 * 0.05).sin() * 8000.0) as i16)
            .collect();
        for _ in 0..50 {
            encoder.write_block(&block).unwrap();
        }
        encoder.finish().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.len() > 1000);
        // every MP3 frame starts with an 11-bit sync word
        let synced = bytes.windows(2).any(|w| w[0] == 0xFF && w[1] & 0xE0 == 0xE0);
        assert!(synced);
    }
}

//! Configuration loaded from a JSON file with environment variable overrides

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/radio.json";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Tunable band
    pub band: BandConfig,

    /// Frequency tuned right after power-up, in MHz
    pub default_frequency_mhz: f64,

    pub volume: VolumeConfig,
    pub seek: SeekConfig,
    pub sideband: SidebandConfig,
    pub timing: TimingConfig,
    pub hardware: HardwareConfig,
    pub audio: AudioConfig,
}

/// Frequency band bounds and channel spacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BandConfig {
    pub min_mhz: f64,
    pub max_mhz: f64,
    pub step_mhz: f64,
}

/// Volume range (chip levels 0-15)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub min: u8,
    pub max: u8,
    pub default: u8,
    /// Attenuate the whole volume table by 30 dB (SYSCONFIG3.VOLEXT)
    pub extended_range: bool,
}

/// Seek behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeekConfig {
    /// Minimum RSSI at the settle point for a seek to count as a station
    pub min_rssi: u8,
    /// RSSI threshold programmed into the chip (SYSCONFIG2.SEEKTH)
    pub chip_threshold: u8,
    /// Continue from the opposite band edge when the band limit is reached
    pub wrap: bool,
}

/// RDS decoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SidebandConfig {
    pub enabled: bool,
    /// Poll ticks without a valid group of a kind before that kind is cleared
    pub stale_after_ticks: u32,
}

/// Poll intervals and bounded poll budgets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Session status/RDS poll interval
    pub poll_interval_ms: u64,
    pub tune_poll_interval_ms: u64,
    pub tune_max_polls: u32,
    pub seek_poll_interval_ms: u64,
    pub seek_max_polls: u32,
}

/// Bus and control line wiring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub i2c_bus: u8,
    pub i2c_address: u8,
    /// BCM pin driving the chip's RST line
    pub reset_pin: u8,
    /// BCM pin wired to SDIO (held low during reset to select 2-wire mode)
    pub sdio_pin: u8,
}

/// Output encoding of recordings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Mp3,
    Wav,
}

/// Audio recording configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Input device name; `None` picks the host default
    pub device: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub bitrate_kbps: u32,
    /// Frames per captured block
    pub block_frames: usize,
    /// Blocks buffered between the input stream and the encoder
    pub buffer_blocks: usize,
    pub encoding: Encoding,
    pub output_directory: PathBuf,
    /// Filename pattern with `{timestamp}` and `{frequency}` placeholders
    pub filename_pattern: String,
    /// chrono format string for `{timestamp}`
    pub timestamp_format: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            band: BandConfig::default(),
            default_frequency_mhz: 96.8,
            volume: VolumeConfig::default(),
            seek: SeekConfig::default(),
            sideband: SidebandConfig::default(),
            timing: TimingConfig::default(),
            hardware: HardwareConfig::default(),
            audio: AudioConfig::default(),
        }
    }
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            min_mhz: 87.5,
            max_mhz: 108.0,
            step_mhz: 0.1,
        }
    }
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            min: 0,
            max: 15,
            default: 8,
            extended_range: false,
        }
    }
}

impl Default for SeekConfig {
    fn default() -> Self {
        Self {
            min_rssi: 20,
            chip_threshold: 20,
            wrap: true,
        }
    }
}

impl Default for SidebandConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stale_after_ticks: 600, // 60 s at the default poll interval
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            tune_poll_interval_ms: 10,
            tune_max_polls: 200,  // 2 s
            seek_poll_interval_ms: 100,
            seek_max_polls: 100,  // 10 s, a full sweep takes ~60 ms per channel
        }
    }
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            i2c_address: crate::tuner::SI4703_I2C_ADDR,
            reset_pin: 17,
            sdio_pin: 2,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            device: None,
            sample_rate: 44_100,
            channels: 2,
            bitrate_kbps: 128,
            block_frames: 1024,
            buffer_blocks: 64,
            encoding: Encoding::Mp3,
            output_directory: PathBuf::from("recordings"),
            filename_pattern: "radio_{frequency}_{timestamp}.mp3".to_string(),
            timestamp_format: "%Y%m%d_%H%M%S".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?;
        Ok(config)
    }

    /// Load from `FM_RECORDER_CONFIG` (or the default path), falling back to
    /// defaults only when the file does not exist, then apply env overrides
    /// and validate.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var("FM_RECORDER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let config = if path.exists() {
            Self::load(&path)?
        } else {
            Self::default()
        };

        let config = config.with_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    ///
    /// - FM_RECORDER_FREQUENCY → default_frequency_mhz
    /// - FM_RECORDER_VOLUME → volume.default
    /// - FM_RECORDER_OUTPUT_DIR → audio.output_directory
    /// - FM_RECORDER_I2C_BUS → hardware.i2c_bus
    /// - FM_RECORDER_AUDIO_DEVICE → audio.device
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(freq) = std::env::var("FM_RECORDER_FREQUENCY")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.default_frequency_mhz = freq;
        }

        if let Some(volume) = std::env::var("FM_RECORDER_VOLUME")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.volume.default = volume;
        }

        if let Ok(dir) = std::env::var("FM_RECORDER_OUTPUT_DIR") {
            if !dir.is_empty() {
                self.audio.output_directory = PathBuf::from(dir);
            }
        }

        if let Some(bus) = std::env::var("FM_RECORDER_I2C_BUS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            self.hardware.i2c_bus = bus;
        }

        if let Ok(device) = std::env::var("FM_RECORDER_AUDIO_DEVICE") {
            if !device.is_empty() {
                self.audio.device = Some(device);
            }
        }

        self
    }

    /// Reject configurations the chip or the encoder cannot honour
    pub fn validate(&self) -> Result<()> {
        let band = &self.band;
        if !(band.min_mhz.is_finite() && band.max_mhz.is_finite() && band.min_mhz < band.max_mhz) {
            bail!("band: min_mhz must be below max_mhz");
        }
        if ![0.05, 0.1, 0.2].iter().any(|s| (band.step_mhz - s).abs() < 1e-9) {
            bail!("band: step_mhz must be 0.05, 0.1 or 0.2 (got {})", band.step_mhz);
        }
        if ![76.0, 87.5].iter().any(|low| (band.min_mhz - low).abs() < 1e-9) {
            bail!("band: min_mhz must be 76.0 or 87.5 (got {})", band.min_mhz);
        }
        if band.max_mhz > 108.0 {
            bail!("band: max_mhz must not exceed 108.0 (got {})", band.max_mhz);
        }
        if self.default_frequency_mhz < band.min_mhz || self.default_frequency_mhz > band.max_mhz {
            bail!(
                "default_frequency_mhz {} is outside the band {}-{}",
                self.default_frequency_mhz,
                band.min_mhz,
                band.max_mhz
            );
        }

        let vol = &self.volume;
        if !(vol.min <= vol.default && vol.default <= vol.max && vol.max <= 15) {
            bail!("volume: expected min <= default <= max <= 15");
        }

        if self.sideband.stale_after_ticks == 0 {
            bail!("sideband: stale_after_ticks must be positive");
        }

        let timing = &self.timing;
        if timing.poll_interval_ms == 0 || timing.tune_max_polls == 0 || timing.seek_max_polls == 0 {
            bail!("timing: poll interval and poll budgets must be positive");
        }

        let audio = &self.audio;
        if audio.channels != 1 && audio.channels != 2 {
            bail!("audio: channels must be 1 or 2 (got {})", audio.channels);
        }
        if audio.sample_rate == 0 || audio.block_frames == 0 || audio.buffer_blocks == 0 {
            bail!("audio: sample_rate, block_frames and buffer_blocks must be positive");
        }
        if !audio.filename_pattern.contains("{timestamp}") {
            bail!("audio: filename_pattern must contain {{timestamp}}");
        }

        Ok(())
    }
}

//! Si4703 tuner driver
//!
//! Owns the shadow register image and the driver state machine:
//!
//! ```text
//! Uninitialized -> PoweringUp -> Ready <-> Tuning / Seeking
//!                                Ready -> Off
//! any bus failure -> Faulted (terminal)
//! ```
//!
//! Register writes are prepared on a copy of the image and committed only
//! after the whole block transaction succeeded.

use tracing::{debug, error, info, warn};

use crate::config::{Config, SeekConfig, VolumeConfig};
use crate::error::TunerError;

use super::bus::{BusError, BusTransport};
use super::registers::*;

/// RST/SDIO held low before mode selection
const RESET_SETTLE_MS: u32 = 100;
/// Wait after the RST edge that latches 2-wire mode
const MODE_SELECT_MS: u32 = 10;
/// Crystal start-up time before the first readiness check
const OSCILLATOR_SETTLE_MS: u32 = 500;
const OSCILLATOR_POLL_MS: u32 = 100;
const OSCILLATOR_MAX_POLLS: u32 = 10;
/// Power-up time after ENABLE
const POWERUP_MS: u32 = 110;
/// Default seek SNR threshold programmed into SYSCONFIG3
const SEEK_SNR: u16 = 4;

/// Driver state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunerState {
    Uninitialized,
    PoweringUp,
    Ready,
    Tuning,
    Seeking,
    Off,
    Faulted,
}

impl std::fmt::Display for TunerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::PoweringUp => "powering-up",
            Self::Ready => "ready",
            Self::Tuning => "tuning",
            Self::Seeking => "seeking",
            Self::Off => "off",
            Self::Faulted => "faulted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekDirection {
    Up,
    Down,
}

/// Band geometry in kHz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub low_khz: u32,
    pub high_khz: u32,
    pub step_khz: u32,
}

impl Band {
    pub fn from_mhz(min_mhz: f64, max_mhz: f64, step_mhz: f64) -> Self {
        Self {
            low_khz: (min_mhz * 1000.0).round() as u32,
            high_khz: (max_mhz * 1000.0).round() as u32,
            step_khz: (step_mhz * 1000.0).round() as u32,
        }
    }

    pub fn contains_mhz(&self, mhz: f64) -> bool {
        let khz = mhz * 1000.0;
        khz >= self.low_khz as f64 - 0.5 && khz <= self.high_khz as f64 + 0.5
    }

    /// Highest channel index that still lies inside the band
    pub fn max_channel(&self) -> u16 {
        ((self.high_khz - self.low_khz) / self.step_khz) as u16
    }

    /// Channel index nearest to `mhz`, clamped to the band
    pub fn channel_for(&self, mhz: f64) -> u16 {
        let offset = (mhz * 1000.0 - self.low_khz as f64) / self.step_khz as f64;
        (offset.round().max(0.0) as u16).min(self.max_channel())
    }

    pub fn frequency_khz(&self, channel: u16) -> u32 {
        self.low_khz + channel as u32 * self.step_khz
    }

    pub fn frequency_mhz(&self, channel: u16) -> f64 {
        self.frequency_khz(channel) as f64 / 1000.0
    }

    /// SYSCONFIG2.BAND: 0 = 87.5-108, 1 = 76-108, 2 = 76-90
    fn band_bits(&self) -> u16 {
        match (self.low_khz, self.high_khz) {
            (87_500, _) => 0,
            (76_000, high) if high <= 90_000 => 2,
            _ => 1,
        }
    }

    /// SYSCONFIG2.SPACE: 0 = 200 kHz, 1 = 100 kHz, 2 = 50 kHz
    fn space_bits(&self) -> u16 {
        match self.step_khz {
            200 => 0,
            100 => 1,
            _ => 2,
        }
    }
}

/// Bounded poll-for-completion budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval_ms: u32,
    pub max_polls: u32,
}

/// Everything the driver needs from the configuration
#[derive(Debug, Clone, PartialEq)]
pub struct TunerSettings {
    pub band: Band,
    pub volume: VolumeConfig,
    pub seek: SeekConfig,
    pub rds_enabled: bool,
    pub tune_policy: PollPolicy,
    pub seek_policy: PollPolicy,
}

impl TunerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            band: Band::from_mhz(config.band.min_mhz, config.band.max_mhz, config.band.step_mhz),
            volume: config.volume.clone(),
            seek: config.seek.clone(),
            rds_enabled: config.sideband.enabled,
            tune_policy: PollPolicy {
                interval_ms: config.timing.tune_poll_interval_ms as u32,
                max_polls: config.timing.tune_max_polls,
            },
            seek_policy: PollPolicy {
                interval_ms: config.timing.seek_poll_interval_ms as u32,
                max_polls: config.timing.seek_max_polls,
            },
        }
    }
}

/// One poll tick worth of chip status
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TunerStatus {
    pub frequency_mhz: f64,
    pub rssi: u8,
    pub stereo: bool,
    /// The chip holds a fresh RDS group in RDSA..RDSD
    pub rds_ready: bool,
    pub rds_blocks: [u16; 4],
    /// 2-bit error level per block (0 none .. 3 uncorrectable)
    pub block_errors: [u8; 4],
}

/// Si4703 driver over any bus transport
pub struct TunerDriver<B: BusTransport> {
    bus: B,
    settings: TunerSettings,
    image: RegisterImage,
    state: TunerState,
    channel: u16,
    volume: u8,
    muted: bool,
}

impl<B: BusTransport> TunerDriver<B> {
    pub fn new(bus: B, settings: TunerSettings) -> Self {
        let volume = settings.volume.default;
        Self {
            bus,
            settings,
            image: RegisterImage::new(),
            state: TunerState::Uninitialized,
            channel: 0,
            volume,
            muted: false,
        }
    }

    pub fn state(&self) -> TunerState {
        self.state
    }

    pub fn frequency_mhz(&self) -> f64 {
        self.settings.band.frequency_mhz(self.channel)
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn settings(&self) -> &TunerSettings {
        &self.settings
    }

    /// Reset the chip into 2-wire mode, start the oscillator and power up
    pub fn power_up(&mut self) -> Result<(), TunerError> {
        if self.state != TunerState::Uninitialized {
            return Err(TunerError::HardwareUnavailable(format!(
                "power-up needs a fresh driver (state is {})",
                self.state
            )));
        }
        self.state = TunerState::PoweringUp;
        info!("Powering up Si4703...");

        // Reset with SDIO low selects the 2-wire interface
        self.bus.hold_reset().map_err(|e| self.fault("reset hold", e))?;
        self.bus.delay_ms(RESET_SETTLE_MS);
        self.bus
            .select_two_wire_mode()
            .map_err(|e| self.fault("mode select", e))?;
        self.bus.delay_ms(MODE_SELECT_MS);

        let image = self.read("device id")?;
        let device_id = image.get(DEVICEID);
        if device_id & DEVICE_ID_MASK != DEVICE_ID_SI4703 {
            self.state = TunerState::Faulted;
            error!("Unexpected device id 0x{:04X}", device_id);
            return Err(TunerError::HardwareUnavailable(format!(
                "unexpected device id 0x{:04X}",
                device_id
            )));
        }
        debug!("Device ID: 0x{:04X}, Chip ID: 0x{:04X}", device_id, image.get(CHIPID));
        self.image = image;

        self.commit("oscillator enable", |regs| {
            regs.set_bits(TEST1, TEST1_XOSCEN, true);
        })?;
        self.bus.delay_ms(OSCILLATOR_SETTLE_MS);
        self.wait_for_oscillator()?;

        let settings = self.settings.clone();
        let volume = self.volume;
        self.commit("power configuration", |regs| {
            let mut powercfg = POWERCFG_DMUTE | POWERCFG_ENABLE;
            if settings.rds_enabled {
                powercfg |= POWERCFG_RDSM;
            }
            regs.set(POWERCFG, powercfg);
            regs.set(CHANNEL, 0);

            // 50 us de-emphasis everywhere except the 200 kHz (Americas) raster
            regs.set_bits(SYSCONFIG1, SYSCONFIG1_DE, settings.band.step_khz != 200);
            regs.set_bits(SYSCONFIG1, SYSCONFIG1_RDS, settings.rds_enabled);

            regs.set(
                SYSCONFIG2,
                ((settings.seek.chip_threshold as u16) << SYSCONFIG2_SEEKTH_SHIFT)
                    | (settings.band.band_bits() << SYSCONFIG2_BAND_SHIFT)
                    | (settings.band.space_bits() << SYSCONFIG2_SPACE_SHIFT)
                    | (volume as u16 & SYSCONFIG2_VOLUME_MASK),
            );

            let mut sysconfig3 = SEEK_SNR << SYSCONFIG3_SKSNR_SHIFT;
            if settings.volume.extended_range {
                sysconfig3 |= SYSCONFIG3_VOLEXT;
            }
            regs.set(SYSCONFIG3, sysconfig3);
        })?;
        self.bus.delay_ms(POWERUP_MS);

        let status = self.read("power-up status")?;
        self.channel = status.channel();
        self.state = TunerState::Ready;
        info!(
            "Si4703 powered up (band {:.1}-{:.1} MHz, step {} kHz, RDS {})",
            self.settings.band.low_khz as f64 / 1000.0,
            self.settings.band.high_khz as f64 / 1000.0,
            self.settings.band.step_khz,
            if self.settings.rds_enabled { "on" } else { "off" }
        );
        Ok(())
    }

    /// Tune to `mhz`, rounded to the nearest channel. Returns the tuned frequency.
    pub fn set_frequency(&mut self, mhz: f64) -> Result<f64, TunerError> {
        self.ensure_ready()?;

        let band = self.settings.band;
        if !mhz.is_finite() || !band.contains_mhz(mhz) {
            warn!(
                "Frequency {} MHz outside band ({:.1}-{:.1})",
                mhz,
                band.low_khz as f64 / 1000.0,
                band.high_khz as f64 / 1000.0
            );
            return Err(TunerError::InvalidParameter(format!(
                "frequency {} MHz outside {:.2}-{:.2} MHz",
                mhz,
                band.low_khz as f64 / 1000.0,
                band.high_khz as f64 / 1000.0
            )));
        }

        let channel = band.channel_for(mhz);
        self.state = TunerState::Tuning;
        let result = self.tune_to_channel(channel);
        self.finish_operation();

        let status = result?;
        info!(
            "Tuned to {:.1} MHz (channel {}, RSSI {})",
            self.frequency_mhz(),
            self.channel,
            status.rssi()
        );
        Ok(self.frequency_mhz())
    }

    /// Hardware seek with band wrap and an RSSI gate. Returns the settled frequency.
    pub fn seek(&mut self, direction: SeekDirection) -> Result<f64, TunerError> {
        self.ensure_ready()?;
        self.state = TunerState::Seeking;
        let result = self.seek_with_wrap(direction);
        self.finish_operation();

        match &result {
            Ok(freq) => info!("Seek {:?} found station at {:.1} MHz", direction, freq),
            Err(e) => info!("Seek {:?} ended: {}", direction, e),
        }
        result
    }

    /// Clamp `level` to the configured range and apply it. Returns the applied level.
    pub fn set_volume(&mut self, level: i32) -> Result<u8, TunerError> {
        self.ensure_ready()?;

        let min = self.settings.volume.min;
        let max = self.settings.volume.max;
        let clamped = level.clamp(min as i32, max as i32) as u8;
        if clamped as i32 != level {
            warn!("Volume {} clamped to {} (range {}-{})", level, clamped, min, max);
        }

        self.commit("volume", |regs| {
            regs.set_field(SYSCONFIG2, SYSCONFIG2_VOLUME_MASK, 0, clamped as u16);
        })?;
        self.volume = clamped;
        debug!("Volume set to {}", clamped);
        Ok(clamped)
    }

    /// Mute or unmute via DMUTE; the stored volume level is left untouched
    pub fn mute(&mut self, on: bool) -> Result<(), TunerError> {
        self.ensure_ready()?;
        // DMUTE is active-low: set means audio enabled
        self.commit("mute", |regs| regs.set_bits(POWERCFG, POWERCFG_DMUTE, !on))?;
        self.muted = on;
        debug!("Mute {}", if on { "on" } else { "off" });
        Ok(())
    }

    /// One bus read of the status and RDS registers; never sleeps
    pub fn read_status(&mut self) -> Result<TunerStatus, TunerError> {
        self.ensure_ready()?;
        let image = self.read("status")?;
        Ok(TunerStatus {
            frequency_mhz: self.settings.band.frequency_mhz(image.channel()),
            rssi: image.rssi(),
            stereo: image.stereo(),
            rds_ready: image.rds_ready(),
            rds_blocks: image.rds_blocks(),
            block_errors: image.block_errors(),
        })
    }

    /// Power the chip down and hold it in reset. Safe to call repeatedly.
    pub fn shutdown(&mut self) -> Result<(), TunerError> {
        match self.state {
            TunerState::Uninitialized | TunerState::Off | TunerState::Faulted => return Ok(()),
            _ => {}
        }

        self.commit("power down", |regs| {
            regs.set_bits(POWERCFG, POWERCFG_DMUTE, false);
            regs.set_bits(POWERCFG, POWERCFG_DISABLE | POWERCFG_ENABLE, true);
            regs.set_bits(SYSCONFIG1, SYSCONFIG1_RDS, false);
        })?;
        self.bus.delay_ms(2);
        self.bus.hold_reset().map_err(|e| self.fault("reset hold", e))?;
        self.state = TunerState::Off;
        info!("Si4703 powered down");
        Ok(())
    }

    fn ensure_ready(&self) -> Result<(), TunerError> {
        match self.state {
            TunerState::Ready => Ok(()),
            state => Err(TunerError::HardwareUnavailable(format!("tuner is {}", state))),
        }
    }

    fn finish_operation(&mut self) {
        if self.state != TunerState::Faulted {
            self.state = TunerState::Ready;
        }
    }

    /// Move to Faulted and turn a bus error into the terminal error kind
    fn fault(&mut self, context: &str, err: BusError) -> TunerError {
        error!("Bus failure during {}: {}", context, err);
        self.state = TunerState::Faulted;
        TunerError::HardwareUnavailable(format!("{}: {}", context, err))
    }

    fn read(&mut self, context: &str) -> Result<RegisterImage, TunerError> {
        self.bus.read_image().map_err(|e| self.fault(context, e))
    }

    /// Apply `update` to a copy of the image and write it as one transaction.
    /// The shadow image only changes when the write succeeded.
    fn commit<F>(&mut self, context: &str, update: F) -> Result<(), TunerError>
    where
        F: FnOnce(&mut RegisterImage),
    {
        let mut next = self.image;
        update(&mut next);
        match self.bus.write_image(&next) {
            Ok(()) => {
                self.image = next;
                Ok(())
            }
            Err(e) => Err(self.fault(context, e)),
        }
    }

    fn wait_for_oscillator(&mut self) -> Result<(), TunerError> {
        for _ in 0..OSCILLATOR_MAX_POLLS {
            let image = self.read("oscillator check")?;
            let id_ok = image.get(DEVICEID) & DEVICE_ID_MASK == DEVICE_ID_SI4703;
            if id_ok && image.get(TEST1) & TEST1_XOSCEN != 0 {
                debug!("Oscillator running");
                return Ok(());
            }
            self.bus.delay_ms(OSCILLATOR_POLL_MS);
        }
        self.state = TunerState::Faulted;
        Err(TunerError::HardwareUnavailable(
            "crystal oscillator did not start".to_string(),
        ))
    }

    /// Poll until STC is set; returns the image captured at completion
    fn wait_for_stc(
        &mut self,
        policy: PollPolicy,
        operation: &'static str,
    ) -> Result<RegisterImage, TunerError> {
        for _ in 0..policy.max_polls {
            self.bus.delay_ms(policy.interval_ms);
            let image = self.read(operation)?;
            if image.stc() {
                return Ok(image);
            }
        }
        warn!("{} timed out after {} polls", operation, policy.max_polls);
        Err(TunerError::OperationTimeout {
            operation,
            polls: policy.max_polls,
        })
    }

    /// After clearing TUNE/SEEK the chip drops STC; wait for it
    fn wait_for_stc_clear(
        &mut self,
        policy: PollPolicy,
        operation: &'static str,
    ) -> Result<(), TunerError> {
        for _ in 0..policy.max_polls {
            let image = self.read(operation)?;
            if !image.stc() {
                return Ok(());
            }
            self.bus.delay_ms(policy.interval_ms);
        }
        Err(TunerError::OperationTimeout {
            operation,
            polls: policy.max_polls,
        })
    }

    /// TUNE handshake: set TUNE, wait for STC, clear TUNE, wait for STC low
    fn tune_to_channel(&mut self, channel: u16) -> Result<RegisterImage, TunerError> {
        let policy = self.settings.tune_policy;
        self.commit("tune start", |regs| {
            let current = regs.get(CHANNEL) & !(CHANNEL_TUNE | CHANNEL_MASK);
            regs.set(CHANNEL, current | (channel & CHANNEL_MASK) | CHANNEL_TUNE);
        })?;

        let completed = self.wait_for_stc(policy, "tune");

        // The TUNE bit is cleared whether or not the chip completed
        self.commit("tune clear", |regs| regs.set_bits(CHANNEL, CHANNEL_TUNE, false))?;
        let image = completed?;
        self.wait_for_stc_clear(policy, "tune")?;

        self.channel = image.channel();
        Ok(image)
    }

    /// SEEK handshake; returns the image captured when STC was set
    fn hardware_seek(&mut self, direction: SeekDirection) -> Result<RegisterImage, TunerError> {
        let policy = self.settings.seek_policy;
        self.commit("seek start", |regs| {
            regs.set_bits(POWERCFG, POWERCFG_SEEKUP, direction == SeekDirection::Up);
            // Stop at the band limit; wrapping is handled here, not by the chip
            regs.set_bits(POWERCFG, POWERCFG_SKMODE, true);
            regs.set_bits(POWERCFG, POWERCFG_SEEK, true);
        })?;

        let completed = self.wait_for_stc(policy, "seek");
        self.commit("seek clear", |regs| regs.set_bits(POWERCFG, POWERCFG_SEEK, false))?;
        let image = completed?;
        self.wait_for_stc_clear(policy, "seek")?;

        self.channel = image.channel();
        Ok(image)
    }

    fn seek_with_wrap(&mut self, direction: SeekDirection) -> Result<f64, TunerError> {
        let mut settled = self.hardware_seek(direction)?;

        if settled.sf_bl() && self.settings.seek.wrap {
            let edge = match direction {
                SeekDirection::Up => 0,
                SeekDirection::Down => self.settings.band.max_channel(),
            };
            debug!(
                "Band limit reached, wrapping to {:.1} MHz",
                self.settings.band.frequency_mhz(edge)
            );
            // The seek below starts past the edge, so the edge itself is checked here
            let at_edge = self.tune_to_channel(edge)?;
            let threshold = self.settings.seek.min_rssi.max(self.settings.seek.chip_threshold);
            if at_edge.rssi() >= threshold {
                info!(
                    "Station found at band edge {:.1} MHz (RSSI {})",
                    self.frequency_mhz(),
                    at_edge.rssi()
                );
                return Ok(self.frequency_mhz());
            }
            settled = self.hardware_seek(direction)?;
        }

        if settled.sf_bl() {
            return Err(TunerError::NoStationFound {
                frequency_mhz: self.frequency_mhz(),
                rssi: settled.rssi(),
            });
        }

        if settled.rssi() < self.settings.seek.min_rssi {
            return Err(TunerError::NoStationFound {
                frequency_mhz: self.frequency_mhz(),
                rssi: settled.rssi(),
            });
        }

        Ok(self.frequency_mhz())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tuner::sim::{SimBus, SimulatedChip};

    fn settings() -> TunerSettings {
        let mut config = Config::default();
        config.timing.tune_poll_interval_ms = 0;
        config.timing.seek_poll_interval_ms = 0;
        TunerSettings::from_config(&config)
    }

    fn powered(chip: &SimulatedChip, settings: TunerSettings) -> TunerDriver<SimBus> {
        let mut driver = TunerDriver::new(chip.bus(), settings);
        driver.power_up().unwrap();
        driver
    }

    #[test]
    fn test_band_channel_math() {
        let band = Band::from_mhz(87.5, 108.0, 0.1);
        assert_eq!(band.channel_for(87.5), 0);
        assert_eq!(band.channel_for(100.0), 125);
        assert_eq!(band.channel_for(108.0), 205);
        assert_eq!(band.channel_for(100.04), 125);
        assert_eq!(band.channel_for(100.06), 126);
        assert_eq!(band.max_channel(), 205);
        assert_eq!(band.frequency_mhz(130), 100.5);

        let us = Band::from_mhz(87.5, 108.0, 0.2);
        assert_eq!(us.max_channel(), 102);
        assert_eq!(us.channel_for(108.0), 102); // 108.1 is off the band
    }

    #[test]
    fn test_power_up_sequence() {
        let chip = SimulatedChip::new();
        let driver = powered(&chip, settings());
        assert_eq!(driver.state(), TunerState::Ready);

        let model = chip.model();
        // RST/SDIO low first, then RST high
        assert_eq!(
            model.pin_log,
            vec![("sdio", false), ("rst", false), ("rst", true)]
        );
        // every write transmits exactly registers 0x02..=0x07
        assert!(model.writes.iter().all(|w| w.len() == WRITE_LEN));
        assert!(model.regs[TEST1] & TEST1_XOSCEN != 0);
        assert!(model.regs[POWERCFG] & POWERCFG_ENABLE != 0);
        assert!(model.regs[POWERCFG] & POWERCFG_DMUTE != 0);
        assert_eq!(model.regs[SYSCONFIG2] & SYSCONFIG2_VOLUME_MASK, 8);
    }

    #[test]
    fn test_power_up_without_chip_is_unavailable() {
        let chip = SimulatedChip::new();
        chip.model().present = false;
        let mut driver = TunerDriver::new(chip.bus(), settings());

        let err = driver.power_up().unwrap_err();
        assert!(matches!(err, TunerError::HardwareUnavailable(_)));
        assert_eq!(driver.state(), TunerState::Faulted);
        // terminal: nothing works afterwards
        assert!(matches!(
            driver.set_frequency(100.0),
            Err(TunerError::HardwareUnavailable(_))
        ));
        assert!(driver.power_up().is_err());
    }

    #[test]
    fn test_power_up_wrong_device_id() {
        let chip = SimulatedChip::new();
        chip.model().regs[DEVICEID] = 0x5555;
        let mut driver = TunerDriver::new(chip.bus(), settings());
        assert!(matches!(
            driver.power_up(),
            Err(TunerError::HardwareUnavailable(_))
        ));
        assert_eq!(driver.state(), TunerState::Faulted);
    }

    #[test]
    fn test_operations_before_power_up_fail() {
        let chip = SimulatedChip::new();
        let mut driver = TunerDriver::new(chip.bus(), settings());
        assert!(matches!(
            driver.set_volume(3),
            Err(TunerError::HardwareUnavailable(_))
        ));
        assert!(driver.read_status().is_err());
    }

    #[test]
    fn test_set_frequency_rounds_to_step() {
        let chip = SimulatedChip::new();
        let mut driver = powered(&chip, settings());

        for (requested, expected) in [(100.5, 100.5), (87.5, 87.5), (108.0, 108.0), (96.84, 96.8)] {
            let tuned = driver.set_frequency(requested).unwrap();
            assert!((tuned - expected).abs() < 1e-9, "{} -> {}", requested, tuned);
            assert!((driver.frequency_mhz() - expected).abs() < 1e-9);
        }
        assert_eq!(driver.state(), TunerState::Ready);
        // TUNE bit cleared after completion
        assert_eq!(chip.model().regs[CHANNEL] & CHANNEL_TUNE, 0);
    }

    #[test]
    fn test_set_frequency_out_of_band_rejected_without_bus_traffic() {
        let chip = SimulatedChip::new();
        let mut driver = powered(&chip, settings());
        driver.set_frequency(99.0).unwrap();
        let writes_before = chip.model().writes.len();

        for bad in [87.4, 108.1, 50.0, f64::NAN] {
            assert!(matches!(
                driver.set_frequency(bad),
                Err(TunerError::InvalidParameter(_))
            ));
        }
        assert_eq!(chip.model().writes.len(), writes_before);
        assert_eq!(driver.frequency_mhz(), 99.0);
        assert_eq!(driver.state(), TunerState::Ready);
    }

    #[test]
    fn test_tune_timeout_is_recoverable() {
        let chip = SimulatedChip::new();
        let mut driver = powered(&chip, settings());
        chip.model().never_complete = true;

        let err = driver.set_frequency(101.0).unwrap_err();
        assert_eq!(
            err,
            TunerError::OperationTimeout {
                operation: "tune",
                polls: 200
            }
        );
        assert_eq!(driver.state(), TunerState::Ready);
        assert_eq!(chip.model().regs[CHANNEL] & CHANNEL_TUNE, 0);

        chip.model().never_complete = false;
        assert_eq!(driver.set_frequency(101.0).unwrap(), 101.0);
    }

    #[test]
    fn test_failed_write_is_not_committed_and_faults() {
        let chip = SimulatedChip::new();
        let mut driver = powered(&chip, settings());
        let volume_before = driver.volume();
        chip.model().fail_next_write = true;

        assert!(matches!(
            driver.set_volume(12),
            Err(TunerError::HardwareUnavailable(_))
        ));
        assert_eq!(driver.volume(), volume_before);
        assert_eq!(driver.image.get(SYSCONFIG2) & SYSCONFIG2_VOLUME_MASK, volume_before as u16);
        assert_eq!(driver.state(), TunerState::Faulted);
    }

    #[test]
    fn test_volume_clamped_and_mute_preserves_level() {
        let chip = SimulatedChip::new();
        let mut driver = powered(&chip, settings());

        assert_eq!(driver.set_volume(11).unwrap(), 11);
        assert_eq!(driver.set_volume(40).unwrap(), 15);
        assert_eq!(driver.set_volume(-3).unwrap(), 0);
        driver.set_volume(6).unwrap();

        driver.mute(true).unwrap();
        assert!(driver.is_muted());
        assert_eq!(chip.model().regs[POWERCFG] & POWERCFG_DMUTE, 0);
        assert_eq!(chip.model().regs[SYSCONFIG2] & SYSCONFIG2_VOLUME_MASK, 6);

        driver.mute(false).unwrap();
        assert!(!driver.is_muted());
        assert_ne!(chip.model().regs[POWERCFG] & POWERCFG_DMUTE, 0);
        assert_eq!(driver.volume(), 6);
    }

    #[test]
    fn test_seek_finds_station() {
        let chip = SimulatedChip::new();
        chip.model().stations = vec![(130, 45), (160, 38)];
        let mut driver = powered(&chip, settings());
        driver.set_frequency(100.0).unwrap();

        assert_eq!(driver.seek(SeekDirection::Up).unwrap(), 100.5);
        assert_eq!(driver.seek(SeekDirection::Up).unwrap(), 103.5);
        assert_eq!(driver.seek(SeekDirection::Down).unwrap(), 100.5);
        assert_eq!(chip.model().regs[POWERCFG] & POWERCFG_SEEK, 0);
    }

    #[test]
    fn test_seek_wraps_at_band_limit() {
        let chip = SimulatedChip::new();
        chip.model().stations = vec![(20, 40)];
        let mut driver = powered(&chip, settings());
        driver.set_frequency(105.0).unwrap();

        assert_eq!(driver.seek(SeekDirection::Up).unwrap(), 89.5);
    }

    #[test]
    fn test_seek_wrap_finds_station_on_edge_channel() {
        let chip = SimulatedChip::new();
        chip.model().stations = vec![(0, 40)];
        let mut driver = powered(&chip, settings());
        driver.set_frequency(105.0).unwrap();

        assert_eq!(driver.seek(SeekDirection::Up).unwrap(), 87.5);
        assert_eq!(driver.frequency_mhz(), 87.5);

        let top = driver.settings.band.max_channel();
        chip.model().stations = vec![(top, 40)];
        driver.set_frequency(90.0).unwrap();
        assert_eq!(driver.seek(SeekDirection::Down).unwrap(), 108.0);
    }

    #[test]
    fn test_seek_wrap_skips_weak_edge_channel() {
        let chip = SimulatedChip::new();
        chip.model().stations = vec![(0, 12), (20, 40)];
        let mut driver = powered(&chip, settings());
        driver.set_frequency(105.0).unwrap();

        assert_eq!(driver.seek(SeekDirection::Up).unwrap(), 89.5);
    }

    #[test]
    fn test_seek_without_wrap_stops_at_band_edge() {
        let chip = SimulatedChip::new();
        chip.model().stations = vec![(20, 40)];
        let mut settings = settings();
        settings.seek.wrap = false;
        let mut driver = powered(&chip, settings);
        driver.set_frequency(105.0).unwrap();

        let err = driver.seek(SeekDirection::Up).unwrap_err();
        assert!(matches!(err, TunerError::NoStationFound { .. }));
        assert_eq!(driver.frequency_mhz(), 108.0);
        assert_eq!(driver.state(), TunerState::Ready);
    }

    #[test]
    fn test_seek_weak_station_fails_quality_gate() {
        let chip = SimulatedChip::new();
        // chip threshold lets it stop, our gate rejects it
        chip.model().stations = vec![(130, 22)];
        let mut settings = settings();
        settings.seek.min_rssi = 30;
        let mut driver = powered(&chip, settings);
        driver.set_frequency(100.0).unwrap();

        match driver.seek(SeekDirection::Up) {
            Err(TunerError::NoStationFound { frequency_mhz, rssi }) => {
                assert_eq!(frequency_mhz, 100.5);
                assert_eq!(rssi, 22);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(driver.frequency_mhz(), 100.5);
    }

    #[test]
    fn test_read_status_single_transaction() {
        let chip = SimulatedChip::new();
        chip.model().stations = vec![(130, 50)];
        let mut driver = powered(&chip, settings());
        driver.set_frequency(100.5).unwrap();
        chip.model()
            .rds_queue
            .push_back(([0x1234, 0x0408, 0x0000, 0x4142], [0, 1, 0, 0]));

        let reads_before = chip.model().reads;
        let status = driver.read_status().unwrap();
        assert_eq!(chip.model().reads, reads_before + 1);
        assert_eq!(status.frequency_mhz, 100.5);
        assert_eq!(status.rssi, 50);
        assert!(status.rds_ready);
        assert_eq!(status.rds_blocks, [0x1234, 0x0408, 0x0000, 0x4142]);
        assert_eq!(status.block_errors, [0, 1, 0, 0]);

        let status = driver.read_status().unwrap();
        assert!(!status.rds_ready);
    }

    #[test]
    fn test_shutdown_is_idempotent() {
        let chip = SimulatedChip::new();
        let mut driver = powered(&chip, settings());
        driver.shutdown().unwrap();
        assert_eq!(driver.state(), TunerState::Off);
        let writes = chip.model().writes.len();
        driver.shutdown().unwrap();
        assert_eq!(chip.model().writes.len(), writes);
        assert!(chip.model().regs[POWERCFG] & POWERCFG_DISABLE != 0);
        assert_eq!(chip.model().pin_log.last(), Some(&("rst", false)));
        assert!(driver.set_frequency(100.0).is_err());
    }
}

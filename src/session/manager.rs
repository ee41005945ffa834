//! Radio session - owns the tuner, the RDS decoder and the capture pipeline

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{select, tick, Receiver};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::capture::{AudioInput, CapturePipeline, RecordingSummary};
use crate::config::Config;
use crate::error::{CaptureError, RadioError, TunerError};
use crate::rds::{SidebandDecoder, SidebandGroup, StationMetadata};
use crate::tuner::{BusTransport, TunerDriver, TunerSettings, TunerState};

use super::handle::{Command, RecordingChange, SessionHandle};
use super::state::{SessionStats, SessionStatus};

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(60);

/// Serializes every tuner and recording operation on one thread
pub struct RadioSession<B: BusTransport> {
    driver: TunerDriver<B>,
    decoder: SidebandDecoder,
    pipeline: CapturePipeline,
    rds_enabled: bool,
    poll_interval: Duration,
    metadata_tx: watch::Sender<StationMetadata>,
    stats: Arc<SessionStats>,
    signal_strength: u8,
    stereo: bool,
}

impl<B: BusTransport + Send + 'static> RadioSession<B> {
    /// Start the session thread. The tuner stays off until `power_up`.
    pub fn spawn(
        config: &Config,
        bus: B,
        input: Box<dyn AudioInput>,
    ) -> Result<(SessionHandle, JoinHandle<()>)> {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (metadata_tx, metadata_rx) = watch::channel(StationMetadata::default());
        let stats = Arc::new(SessionStats::new());

        info!(
            "Audio input: {} ({} Hz, {} ch, {:?})",
            input.name(),
            config.audio.sample_rate,
            config.audio.channels,
            config.audio.encoding
        );

        let session = Self {
            driver: TunerDriver::new(bus, TunerSettings::from_config(config)),
            decoder: SidebandDecoder::new(config.sideband.stale_after_ticks),
            pipeline: CapturePipeline::new(config.audio.clone(), input),
            rds_enabled: config.sideband.enabled,
            poll_interval: Duration::from_millis(config.timing.poll_interval_ms),
            metadata_tx,
            stats: stats.clone(),
            signal_strength: 0,
            stereo: false,
        };

        let thread = thread::Builder::new()
            .name("radio-session".to_string())
            .spawn(move || session.run(command_rx))
            .context("Failed to spawn radio session thread")?;

        Ok((SessionHandle::new(command_tx, metadata_rx, stats), thread))
    }

    fn run(mut self, commands: Receiver<Command>) {
        info!(
            "Radio session started (poll every {} ms)",
            self.poll_interval.as_millis()
        );

        let ticker = tick(self.poll_interval);
        let mut last_stats_log = Instant::now();

        loop {
            select! {
                recv(commands) -> msg => match msg {
                    Ok(Command::Shutdown(reply)) => {
                        self.stats.record_command();
                        let _ = reply.send(self.shutdown());
                        break;
                    }
                    Ok(command) => self.handle(command),
                    Err(_) => {
                        info!("All session handles dropped");
                        if let Err(e) = self.shutdown() {
                            warn!("Shutdown after handles dropped failed: {}", e);
                        }
                        break;
                    }
                },
                recv(ticker) -> _ => self.poll(),
            }

            if last_stats_log.elapsed() >= STATS_LOG_INTERVAL {
                info!(
                    "[Stats] {:.1} MHz [{}] | {}",
                    self.driver.frequency_mhz(),
                    self.driver.state(),
                    self.stats
                );
                last_stats_log = Instant::now();
            }
        }

        info!("Radio session stopped. {}", self.stats);
    }

    fn handle(&mut self, command: Command) {
        self.stats.record_command();
        match command {
            Command::PowerUp(reply) => {
                let result = self.driver.power_up();
                if result.is_ok() {
                    self.clear_metadata();
                }
                let _ = reply.send(result.map_err(RadioError::from));
            }
            Command::SetFrequency(mhz, reply) => {
                let result = self.driver.set_frequency(mhz);
                self.after_channel_change(&result);
                let _ = reply.send(result.map_err(RadioError::from));
            }
            Command::Seek(direction, reply) => {
                let result = self.driver.seek(direction);
                self.after_channel_change(&result);
                let _ = reply.send(result.map_err(RadioError::from));
            }
            Command::SetVolume(level, reply) => {
                let _ = reply.send(self.driver.set_volume(level).map_err(RadioError::from));
            }
            Command::Mute(on, reply) => {
                let _ = reply.send(self.driver.mute(on).map_err(RadioError::from));
            }
            Command::RecordStart(reply) => {
                let _ = reply.send(self.start_recording());
            }
            Command::RecordStop(reply) => {
                let _ = reply.send(self.stop_recording());
            }
            Command::RecordToggle(reply) => {
                let result = if self.pipeline.is_recording() {
                    self.stop_recording().map(RecordingChange::Stopped)
                } else {
                    self.start_recording().map(RecordingChange::Started)
                };
                let _ = reply.send(result);
            }
            Command::Status(reply) => {
                let _ = reply.send(Ok(self.status()));
            }
            Command::Shutdown(reply) => {
                let _ = reply.send(self.shutdown());
            }
        }
    }

    /// One status read; feeds any pending RDS group to the decoder
    fn poll(&mut self) {
        if self.driver.state() != TunerState::Ready {
            return;
        }
        self.stats.record_poll();

        let status = match self.driver.read_status() {
            Ok(status) => status,
            Err(e) => {
                self.stats.record_poll_failure();
                error!("Status poll failed: {}", e);
                return;
            }
        };
        self.signal_strength = status.rssi;
        self.stereo = status.stereo;

        let mut changed = false;
        if self.rds_enabled && status.rds_ready {
            let group = SidebandGroup::new(status.rds_blocks, status.block_errors);
            let accepted = self.decoder.process(&group);
            self.stats.record_group(accepted);
            changed |= accepted;
        }
        changed |= self.decoder.tick();

        if changed {
            self.publish();
        }
    }

    /// Station data never carries over to a different channel
    fn after_channel_change(&mut self, result: &Result<f64, TunerError>) {
        let moved = !matches!(
            result,
            Err(TunerError::InvalidParameter(_)) | Err(TunerError::HardwareUnavailable(_))
        );
        if moved {
            self.signal_strength = 0;
            self.stereo = false;
            self.clear_metadata();
        }
    }

    fn clear_metadata(&mut self) {
        self.decoder.reset();
        self.publish();
    }

    fn publish(&self) {
        let snapshot = self.decoder.snapshot();
        self.metadata_tx.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            debug!("Station metadata: {}", snapshot);
            *current = snapshot;
            true
        });
    }

    fn start_recording(&mut self) -> Result<std::path::PathBuf, RadioError> {
        let label = format!("{:.1}MHz", self.driver.frequency_mhz());
        Ok(self.pipeline.start(&label)?)
    }

    fn stop_recording(&mut self) -> Result<RecordingSummary, RadioError> {
        self.pipeline.set_station_name(self.decoder.snapshot().station_name);
        Ok(self.pipeline.stop()?)
    }

    fn status(&self) -> SessionStatus {
        let capture = self.pipeline.status();
        let ready = self.driver.state() == TunerState::Ready;
        SessionStatus {
            tuner_state: self.driver.state(),
            frequency_mhz: self.driver.frequency_mhz(),
            volume: self.driver.volume(),
            muted: self.driver.is_muted(),
            signal_strength: if ready { self.signal_strength } else { 0 },
            stereo: ready && self.stereo,
            metadata: self.decoder.snapshot(),
            recording: capture.active,
            recording_path: capture.path,
            recording_elapsed: capture.elapsed,
            dropped_blocks: capture.dropped_blocks,
        }
    }

    /// Stop any recording, then power the tuner down
    fn shutdown(&mut self) -> Result<(), RadioError> {
        match self.stop_recording() {
            Ok(_) | Err(RadioError::Capture(CaptureError::NotRecording)) => {}
            Err(e) => warn!("Recording ended with error during shutdown: {}", e),
        }
        self.driver.shutdown()?;
        self.clear_metadata();
        Ok(())
    }
}

//! Capture-to-file pipeline
//!
//! The input stream pushes sample blocks into a bounded queue; a dedicated
//! `fm-capture` thread pulls them, encodes them and writes the file. The
//! owner only touches atomics and the join handle, so tuner control never
//! waits on audio I/O.

use chrono::{DateTime, Local};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::config::{AudioConfig, Encoding};
use crate::error::CaptureError;

use super::encoder::{open_encoder, AudioEncoder};
use super::input::{AudioFormat, AudioInput, BlockSink, CaptureStats, SampleBlock};
use super::naming::{create_output_file, render_stem};
use super::tags::{write_tags, RecordingTags};

/// Longest the capture thread waits for a block before re-checking the stop flag
const QUEUE_TIMEOUT: Duration = Duration::from_millis(100);

/// What a finished recording produced
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSummary {
    pub path: PathBuf,
    /// Audio duration derived from the frames written
    pub duration: Duration,
    /// Frames written (samples per channel)
    pub samples: u64,
    pub blocks_written: u64,
    pub dropped_blocks: u64,
}

/// Snapshot of the pipeline for status queries
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CaptureStatus {
    pub active: bool,
    pub path: Option<PathBuf>,
    pub elapsed: Duration,
    pub dropped_blocks: u64,
}

struct ActiveRecording {
    path: PathBuf,
    label: String,
    started: Instant,
    started_at: DateTime<Local>,
    /// Keeps the queue connected until the capture thread has been joined
    queue_tx: Sender<SampleBlock>,
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    handle: JoinHandle<Result<(), CaptureError>>,
}

/// Records the audio input to files, one recording at a time
pub struct CapturePipeline {
    config: AudioConfig,
    input: Box<dyn AudioInput>,
    active: Option<ActiveRecording>,
    station_name: Option<String>,
}

impl CapturePipeline {
    pub fn new(config: AudioConfig, input: Box<dyn AudioInput>) -> Self {
        Self {
            config,
            input,
            active: None,
            station_name: None,
        }
    }

    fn format(&self) -> AudioFormat {
        AudioFormat {
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            block_frames: self.config.block_frames,
        }
    }

    /// Start recording to a new file whose name carries `frequency_label`
    pub fn start(&mut self, frequency_label: &str) -> Result<PathBuf, CaptureError> {
        self.reap_failed()?;
        if self.active.is_some() {
            return Err(CaptureError::AlreadyRecording);
        }

        let format = self.format();
        let encoding = self.config.encoding;

        std::fs::create_dir_all(&self.config.output_directory).map_err(|e| {
            CaptureError::CaptureDeviceFailure(format!(
                "Failed to create {}: {}",
                self.config.output_directory.display(),
                e
            ))
        })?;
        let started_at = Local::now();
        let stem = render_stem(
            &self.config.filename_pattern,
            &self.config.timestamp_format,
            started_at,
            frequency_label,
        );
        let (path, file) = create_output_file(&self.config.output_directory, &stem, encoding.extension())
            .map_err(|e| CaptureError::CaptureDeviceFailure(format!("Failed to create recording file: {}", e)))?;

        let (block_tx, block_rx) = bounded::<SampleBlock>(self.config.buffer_blocks);
        let stats = CaptureStats::new();
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = bounded::<Result<(), CaptureError>>(1);

        let handle = {
            let block_rx = block_rx.clone();
            let running = running.clone();
            let stats = stats.clone();
            let bitrate = self.config.bitrate_kbps;
            thread::Builder::new()
                .name("fm-capture".to_string())
                .spawn(move || {
                    run_capture(file, encoding, format, bitrate, block_rx, running, stats, ready_tx)
                })
                .map_err(|e| CaptureError::CaptureDeviceFailure(format!("Failed to spawn capture thread: {}", e)))?
        };

        // Encoder setup happens on the capture thread; wait for its verdict
        let ready = ready_rx.recv().unwrap_or_else(|_| {
            Err(CaptureError::CaptureDeviceFailure("capture thread exited during setup".to_string()))
        });
        if let Err(e) = ready {
            let _ = handle.join();
            discard_file(&path);
            return Err(e);
        }

        let sink = BlockSink::new(block_tx.clone(), block_rx, stats.clone());
        if let Err(e) = self.input.start(&format, sink) {
            error!("Failed to start audio input {}: {}", self.input.name(), e);
            running.store(false, Ordering::SeqCst);
            let _ = handle.join();
            discard_file(&path);
            return Err(e);
        }

        info!(
            "Recording started: {} ({} Hz, {} ch, {:?}, input {})",
            path.display(),
            format.sample_rate,
            format.channels,
            encoding,
            self.input.name()
        );
        self.active = Some(ActiveRecording {
            path: path.clone(),
            label: frequency_label.to_string(),
            started: Instant::now(),
            started_at,
            queue_tx: block_tx,
            running,
            stats,
            handle,
        });
        Ok(path)
    }

    /// Stop the current recording, drain the queue and finalize the file
    pub fn stop(&mut self) -> Result<RecordingSummary, CaptureError> {
        let active = self.active.take().ok_or(CaptureError::NotRecording)?;

        // Input first: once it returns nothing more is queued and the loop
        // can drain what is left
        self.input.stop();
        active.running.store(false, Ordering::SeqCst);
        let result = join_capture(active.handle);
        drop(active.queue_tx);

        let summary = summarize(&active.path, &active.stats, self.config.sample_rate);
        result?;

        if self.config.encoding == Encoding::Mp3 {
            let tags = RecordingTags {
                frequency_label: active.label,
                station_name: self.station_name.clone(),
                recorded_at: active.started_at,
            };
            if let Err(e) = write_tags(&summary.path, &tags) {
                warn!("Could not tag {}: {}", summary.path.display(), e);
            }
        }

        info!(
            "Recording stopped: {} ({:.1}s, {} blocks, {} dropped)",
            summary.path.display(),
            summary.duration.as_secs_f64(),
            summary.blocks_written,
            summary.dropped_blocks
        );
        Ok(summary)
    }

    /// Station name written into the tags of the next finished MP3
    pub fn set_station_name(&mut self, name: Option<String>) {
        self.station_name = name;
    }

    pub fn is_recording(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| !active.handle.is_finished())
    }

    pub fn status(&self) -> CaptureStatus {
        match &self.active {
            Some(active) => CaptureStatus {
                active: !active.handle.is_finished(),
                path: Some(active.path.clone()),
                elapsed: active.started.elapsed(),
                dropped_blocks: active.stats.dropped_blocks.load(Ordering::Relaxed),
            },
            None => CaptureStatus::default(),
        }
    }

    /// A capture thread that ended on its own left a fatal error behind.
    /// Report it once and return to idle.
    fn reap_failed(&mut self) -> Result<(), CaptureError> {
        let finished = self
            .active
            .as_ref()
            .is_some_and(|active| active.handle.is_finished());
        if !finished {
            return Ok(());
        }
        let Some(active) = self.active.take() else {
            return Ok(());
        };

        self.input.stop();
        match join_capture(active.handle) {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Previous recording {} ended with: {}", active.path.display(), e);
                Err(e)
            }
        }
    }
}

impl Drop for CapturePipeline {
    fn drop(&mut self) {
        if self.active.is_some() {
            if let Err(e) = self.stop() {
                warn!("Recording ended with error during shutdown: {}", e);
            }
        }
    }
}

fn join_capture(handle: JoinHandle<Result<(), CaptureError>>) -> Result<(), CaptureError> {
    handle
        .join()
        .unwrap_or_else(|_| Err(CaptureError::CaptureDeviceFailure("capture thread panicked".to_string())))
}

fn summarize(path: &Path, stats: &CaptureStats, sample_rate: u32) -> RecordingSummary {
    let samples = stats.frames_written.load(Ordering::Relaxed);
    RecordingSummary {
        path: path.to_path_buf(),
        duration: Duration::from_secs_f64(samples as f64 / sample_rate as f64),
        samples,
        blocks_written: stats.blocks_written.load(Ordering::Relaxed),
        dropped_blocks: stats.dropped_blocks.load(Ordering::Relaxed),
    }
}

fn discard_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        debug!("Could not remove {}: {}", path.display(), e);
    }
}

fn write_block(
    encoder: &mut dyn AudioEncoder,
    block: &[i16],
    channels: u16,
    stats: &CaptureStats,
) -> Result<(), CaptureError> {
    encoder.write_block(block)?;
    stats
        .frames_written
        .fetch_add((block.len() / channels as usize) as u64, Ordering::Relaxed);
    stats.blocks_written.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

/// Capture loop (runs in dedicated thread)
#[allow(clippy::too_many_arguments)]
fn run_capture(
    file: File,
    encoding: Encoding,
    format: AudioFormat,
    bitrate_kbps: u32,
    block_rx: Receiver<SampleBlock>,
    running: Arc<AtomicBool>,
    stats: Arc<CaptureStats>,
    ready_tx: crossbeam_channel::Sender<Result<(), CaptureError>>,
) -> Result<(), CaptureError> {
    let mut encoder = match open_encoder(encoding, file, &format, bitrate_kbps) {
        Ok(encoder) => {
            let _ = ready_tx.send(Ok(()));
            encoder
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e.clone()));
            return Err(e);
        }
    };
    debug!("Capture thread ready ({:?})", encoding);

    let result = loop {
        if !running.load(Ordering::SeqCst) {
            break Ok(());
        }
        if let Some(message) = stats.failure() {
            break Err(CaptureError::CaptureDeviceFailure(message));
        }
        match block_rx.recv_timeout(QUEUE_TIMEOUT) {
            Ok(block) => {
                if let Err(e) = write_block(encoder.as_mut(), &block, format.channels, &stats) {
                    break Err(e);
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) if !running.load(Ordering::SeqCst) => break Ok(()),
            Err(RecvTimeoutError::Disconnected) => {
                break Err(CaptureError::CaptureDeviceFailure("audio input closed".to_string()));
            }
        }
    };

    // On a clean stop, everything already queued still goes into the file
    let result = result.and_then(|()| {
        while let Ok(block) = block_rx.try_recv() {
            write_block(encoder.as_mut(), &block, format.channels, &stats)?;
        }
        Ok(())
    });

    if let Err(e) = &result {
        error!("Capture failed: {}", e);
    }
    running.store(false, Ordering::SeqCst);

    // Finalize whatever is open, even after a failure
    let finished = encoder.finish();
    result.and(finished)
}

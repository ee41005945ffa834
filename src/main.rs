//! FM Recorder - Si4703 tuner control with RDS and on-demand recording
//!
//! Drives an Si4703 over I2C, decodes RDS station data and records the
//! tuner's audio (via the sound card) to MP3/WAV files. Controlled from
//! stdin; Ctrl+C shuts down cleanly.

mod capture;
mod config;
mod error;
mod hal;
mod rds;
mod session;
mod tuner;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use capture::AudioInput;
use config::Config;
use session::{RadioSession, RecordingChange, SessionHandle};
use tuner::SeekDirection;

const HELP: &str = "commands: f <MHz> | v <0-15> | s [up|down] | m (mute) | r (record) | i (info) | q (quit)";

/// One line of operator input
#[derive(Debug, Clone, PartialEq)]
enum UserCommand {
    Tune(f64),
    Volume(i32),
    Seek(SeekDirection),
    ToggleMute,
    ToggleRecording,
    Info,
    Quit,
}

fn parse_command(line: &str) -> Result<UserCommand, String> {
    let mut parts = line.split_whitespace();
    let verb = parts.next().ok_or_else(|| "empty command".to_string())?;
    let arg = parts.next();

    let command = match verb {
        "f" => {
            let mhz = arg
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| "usage: f <MHz>".to_string())?;
            UserCommand::Tune(mhz)
        }
        "v" => {
            let level = arg
                .and_then(|s| s.parse::<i32>().ok())
                .ok_or_else(|| "usage: v <level>".to_string())?;
            UserCommand::Volume(level)
        }
        "s" => match arg {
            None | Some("up") => UserCommand::Seek(SeekDirection::Up),
            Some("down") => UserCommand::Seek(SeekDirection::Down),
            Some(other) => return Err(format!("unknown seek direction '{}'", other)),
        },
        "m" => UserCommand::ToggleMute,
        "r" => UserCommand::ToggleRecording,
        "i" => UserCommand::Info,
        "q" => UserCommand::Quit,
        other => return Err(format!("unknown command '{}'", other)),
    };
    Ok(command)
}

#[cfg(feature = "rpi")]
fn build_bus(config: &Config) -> Result<hal::rpi::PiBus> {
    hal::rpi::build_bus(&config.hardware).context("Failed to open tuner hardware")
}

#[cfg(not(feature = "rpi"))]
fn build_bus(_config: &Config) -> Result<hal::AbsentBus> {
    warn!("No tuner backend compiled in (feature rpi); tuner control disabled");
    Ok(hal::AbsentBus)
}

#[cfg(feature = "cpal-audio")]
fn build_input(config: &Config) -> Box<dyn AudioInput> {
    match capture::CpalInput::new(config.audio.device.as_deref()) {
        Ok(input) => Box::new(input),
        Err(e) => {
            warn!("Audio input unavailable, recording disabled: {}", e);
            Box::new(capture::UnavailableInput::new(e.to_string()))
        }
    }
}

#[cfg(not(feature = "cpal-audio"))]
fn build_input(_config: &Config) -> Box<dyn AudioInput> {
    warn!("No audio backend compiled in (feature cpal-audio); recording disabled");
    Box::new(capture::UnavailableInput::new(
        "no audio backend compiled in",
    ))
}

/// Returns false when the operator asked to quit
async fn execute(handle: &SessionHandle, command: UserCommand) -> bool {
    let outcome = match command {
        UserCommand::Tune(mhz) => handle
            .set_frequency(mhz)
            .await
            .map(|f| info!("Tuned to {:.1} MHz", f)),
        UserCommand::Volume(level) => handle
            .set_volume(level)
            .await
            .map(|v| info!("Volume {}", v)),
        UserCommand::Seek(direction) => handle
            .seek(direction)
            .await
            .map(|f| info!("Found station at {:.1} MHz", f)),
        UserCommand::ToggleMute => match handle.status().await {
            Ok(status) => handle
                .mute(!status.muted)
                .await
                .map(|_| info!("{}", if status.muted { "Unmuted" } else { "Muted" })),
            Err(e) => Err(e),
        },
        UserCommand::ToggleRecording => handle.record_toggle().await.map(|change| match change {
            RecordingChange::Started(path) => info!("Recording to {}", path.display()),
            RecordingChange::Stopped(summary) => info!(
                "Recording stopped: {} ({:.1}s)",
                summary.path.display(),
                summary.duration.as_secs_f64()
            ),
        }),
        UserCommand::Info => handle.status().await.map(|status| info!("{}", status)),
        UserCommand::Quit => return false,
    };

    if let Err(e) = outcome {
        warn!("{}", e);
    }
    true
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fm_recorder=info")))
        .init();

    info!("===========================================");
    info!("   FM Recorder - Si4703 + RDS");
    info!("===========================================");

    let config = Config::from_env().context("Failed to load configuration")?;

    info!("Configuration:");
    info!(
        "  Band: {:.1}-{:.1} MHz, step {:.2} MHz",
        config.band.min_mhz, config.band.max_mhz, config.band.step_mhz
    );
    info!("  Default frequency: {:.1} MHz", config.default_frequency_mhz);
    info!("  I2C bus: {}", config.hardware.i2c_bus);
    info!(
        "  Recordings: {} ({:?})",
        config.audio.output_directory.display(),
        config.audio.encoding
    );

    let bus = build_bus(&config)?;
    let input = build_input(&config);
    let (handle, session_thread) = RadioSession::spawn(&config, bus, input)?;

    if let Err(e) = handle.power_up().await {
        error!("Tuner power-up failed: {}", e);
        error!("Check the I2C wiring and the RST/SDIO pin numbers.");
        let _ = handle.shutdown().await;
        let _ = session_thread.join();
        return Err(e.into());
    }
    match handle.set_frequency(config.default_frequency_mhz).await {
        Ok(mhz) => info!("Tuned to {:.1} MHz", mhz),
        Err(e) => warn!("Initial tune failed: {}", e),
    }
    if let Err(e) = handle.set_volume(config.volume.default as i32).await {
        warn!("Setting volume failed: {}", e);
    }

    let mut metadata = handle.metadata();
    let metadata_task = tokio::spawn(async move {
        while metadata.changed().await.is_ok() {
            let snapshot = metadata.borrow_and_update().clone();
            if !snapshot.is_empty() {
                info!("RDS: {}", snapshot);
            }
        }
    });

    info!("{}", HELP);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        info!("stdin closed");
                        break;
                    }
                    Err(e) => {
                        error!("Failed to read stdin: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Ok(command) => {
                        if !execute(&handle, command).await {
                            break;
                        }
                    }
                    Err(e) => warn!("{} ({})", e, HELP),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    if let Err(e) = handle.shutdown().await {
        error!("Shutdown failed: {}", e);
    }
    drop(handle);
    metadata_task.abort();
    if session_thread.join().is_err() {
        error!("Radio session thread panicked");
    }

    info!("FM Recorder stopped");
    Ok(())
}

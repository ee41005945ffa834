//! Async command surface of the radio session

use crossbeam_channel::Sender;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

use crate::capture::RecordingSummary;
use crate::error::RadioError;
use crate::rds::StationMetadata;
use crate::tuner::SeekDirection;

use super::state::{SessionStats, SessionStatus};

pub(crate) type Reply<T> = oneshot::Sender<Result<T, RadioError>>;

/// Requests served by the session thread
pub(crate) enum Command {
    PowerUp(Reply<()>),
    Shutdown(Reply<()>),
    SetFrequency(f64, Reply<f64>),
    Seek(SeekDirection, Reply<f64>),
    SetVolume(i32, Reply<u8>),
    Mute(bool, Reply<()>),
    RecordStart(Reply<PathBuf>),
    RecordStop(Reply<RecordingSummary>),
    RecordToggle(Reply<RecordingChange>),
    Status(Reply<SessionStatus>),
}

/// Outcome of a record toggle
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingChange {
    Started(PathBuf),
    Stopped(RecordingSummary),
}

/// Cloneable handle to a running session
#[derive(Clone)]
pub struct SessionHandle {
    commands: Sender<Command>,
    metadata: watch::Receiver<StationMetadata>,
    stats: Arc<SessionStats>,
}

impl SessionHandle {
    pub(crate) fn new(
        commands: Sender<Command>,
        metadata: watch::Receiver<StationMetadata>,
        stats: Arc<SessionStats>,
    ) -> Self {
        Self {
            commands,
            metadata,
            stats,
        }
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, RadioError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(make(reply_tx))
            .map_err(|_| RadioError::SessionClosed)?;
        reply_rx.await.map_err(|_| RadioError::SessionClosed)?
    }

    pub async fn power_up(&self) -> Result<(), RadioError> {
        self.request(Command::PowerUp).await
    }

    /// Stop any recording, power the tuner down and end the session
    pub async fn shutdown(&self) -> Result<(), RadioError> {
        self.request(Command::Shutdown).await
    }

    pub async fn set_frequency(&self, mhz: f64) -> Result<f64, RadioError> {
        self.request(|reply| Command::SetFrequency(mhz, reply)).await
    }

    pub async fn seek(&self, direction: SeekDirection) -> Result<f64, RadioError> {
        self.request(|reply| Command::Seek(direction, reply)).await
    }

    pub async fn set_volume(&self, level: i32) -> Result<u8, RadioError> {
        self.request(|reply| Command::SetVolume(level, reply)).await
    }

    pub async fn mute(&self, on: bool) -> Result<(), RadioError> {
        self.request(|reply| Command::Mute(on, reply)).await
    }

    pub async fn record_start(&self) -> Result<PathBuf, RadioError> {
        self.request(Command::RecordStart).await
    }

    pub async fn record_stop(&self) -> Result<RecordingSummary, RadioError> {
        self.request(Command::RecordStop).await
    }

    pub async fn record_toggle(&self) -> Result<RecordingChange, RadioError> {
        self.request(Command::RecordToggle).await
    }

    pub async fn status(&self) -> Result<SessionStatus, RadioError> {
        self.request(Command::Status).await
    }

    /// Station metadata, updated whenever the decoder's view changes
    pub fn metadata(&self) -> watch::Receiver<StationMetadata> {
        self.metadata.clone()
    }

    pub fn stats(&self) -> &Arc<SessionStats> {
        &self.stats
    }
}

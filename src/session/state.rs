//! Session counters and status snapshots

use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::rds::StationMetadata;
use crate::tuner::TunerState;

/// Counters for the session loop (shared with handles)
#[derive(Debug, Default)]
pub struct SessionStats {
    pub polls: AtomicU64,
    pub poll_failures: AtomicU64,
    pub groups_accepted: AtomicU64,
    pub groups_rejected: AtomicU64,
    pub commands: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_poll(&self) {
        self.polls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_poll_failure(&self) {
        self.poll_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_group(&self, accepted: bool) {
        if accepted {
            self.groups_accepted.fetch_add(1, Ordering::Relaxed);
        } else {
            self.groups_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_command(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    pub fn get_poll_failures(&self) -> u64 {
        self.poll_failures.load(Ordering::Relaxed)
    }

    pub fn get_groups_accepted(&self) -> u64 {
        self.groups_accepted.load(Ordering::Relaxed)
    }

    pub fn get_groups_rejected(&self) -> u64 {
        self.groups_rejected.load(Ordering::Relaxed)
    }

    pub fn get_commands(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Polls: {} (failed {}) | RDS groups: {} accepted, {} rejected | Commands: {}",
            self.get_polls(),
            self.get_poll_failures(),
            self.get_groups_accepted(),
            self.get_groups_rejected(),
            self.get_commands()
        )
    }
}

/// Everything a caller may want to show about the radio
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub tuner_state: TunerState,
    pub frequency_mhz: f64,
    pub volume: u8,
    pub muted: bool,
    /// RSSI from the last poll
    pub signal_strength: u8,
    pub stereo: bool,
    pub metadata: StationMetadata,
    pub recording: bool,
    pub recording_path: Option<PathBuf>,
    pub recording_elapsed: Duration,
    pub dropped_blocks: u64,
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:.1} MHz [{}] vol {}{} | RSSI {} {} | {}",
            self.frequency_mhz,
            self.tuner_state,
            self.volume,
            if self.muted { " (muted)" } else { "" },
            self.signal_strength,
            if self.stereo { "stereo" } else { "mono" },
            self.metadata
        )?;
        if self.recording {
            write!(
                f,
                " | REC {} ({}s, {} dropped)",
                self.recording_path
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
                self.recording_elapsed.as_secs(),
                self.dropped_blocks
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_counters() {
        let stats = SessionStats::new();
        stats.record_poll();
        stats.record_poll();
        stats.record_poll_failure();
        stats.record_group(true);
        stats.record_group(false);
        stats.record_group(false);
        stats.record_command();

        assert_eq!(stats.get_polls(), 2);
        assert_eq!(stats.get_poll_failures(), 1);
        assert_eq!(stats.get_groups_accepted(), 1);
        assert_eq!(stats.get_groups_rejected(), 2);
        assert_eq!(
            stats.to_string(),
            "Polls: 2 (failed 1) | RDS groups: 1 accepted, 2 rejected | Commands: 1"
        );
    }

    #[test]
    fn test_status_display() {
        let status = SessionStatus {
            tuner_state: TunerState::Ready,
            frequency_mhz: 100.5,
            volume: 8,
            muted: true,
            signal_strength: 42,
            stereo: true,
            metadata: StationMetadata::default(),
            recording: true,
            recording_path: Some(PathBuf::from("rec.mp3")),
            recording_elapsed: Duration::from_secs(12),
            dropped_blocks: 0,
        };
        let text = status.to_string();
        assert!(text.starts_with("100.5 MHz [ready] vol 8 (muted) | RSSI 42 stereo"));
        assert!(text.ends_with("REC rec.mp3 (12s, 0 dropped)"));
    }
}

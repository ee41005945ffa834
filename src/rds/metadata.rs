//! Decoded station metadata

use chrono::{DateTime, FixedOffset, Utc};
use std::fmt;

/// European RDS program type names, indexed by PTY code
const PTY_NAMES: [&str; 32] = [
    "None",
    "News",
    "Current Affairs",
    "Information",
    "Sport",
    "Education",
    "Drama",
    "Culture",
    "Science",
    "Varied",
    "Pop Music",
    "Rock Music",
    "Easy Listening",
    "Light Classical",
    "Serious Classical",
    "Other Music",
    "Weather",
    "Finance",
    "Children's",
    "Social Affairs",
    "Religion",
    "Phone In",
    "Travel",
    "Leisure",
    "Jazz Music",
    "Country Music",
    "National Music",
    "Oldies Music",
    "Folk Music",
    "Documentary",
    "Alarm Test",
    "Alarm",
];

pub fn pty_name(code: u8) -> &'static str {
    PTY_NAMES.get(code as usize).copied().unwrap_or("Unknown")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramContent {
    Music,
    Speech,
}

/// Clock time from a 4A group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTime {
    pub utc: DateTime<Utc>,
    /// Local offset in minutes (transmitted in half hours)
    pub offset_minutes: i32,
}

impl ClockTime {
    pub fn local(&self) -> Option<DateTime<FixedOffset>> {
        FixedOffset::east_opt(self.offset_minutes * 60).map(|tz| self.utc.with_timezone(&tz))
    }
}

/// Station metadata as assembled so far
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StationMetadata {
    /// Program identification code
    pub pi: Option<u16>,

    /// Program type code (0-31)
    pub program_type: Option<u8>,

    /// Station name, up to 8 characters; unreceived positions are blanks
    pub station_name: Option<String>,

    /// All four name segments have been received
    pub station_name_complete: bool,

    /// Radiotext, up to 64 characters (32 for 2B)
    pub radiotext: Option<String>,

    pub traffic_program: bool,
    pub traffic_announcement: bool,
    pub content: Option<ProgramContent>,

    /// Alternative frequencies in MHz
    pub alternative_frequencies: Vec<f64>,

    /// Last received clock time
    pub clock: Option<ClockTime>,
}

impl StationMetadata {
    pub fn program_type_name(&self) -> Option<&'static str> {
        self.program_type.map(pty_name)
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl fmt::Display for StationMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PI: {} | Name: {} | PTY: {} | Text: {}",
            self.pi.map(|pi| format!("{:04X}", pi)).as_deref().unwrap_or("-"),
            self.station_name.as_deref().unwrap_or("-"),
            self.program_type_name().unwrap_or("-"),
            self.radiotext.as_deref().unwrap_or("-")
        )?;
        if self.traffic_announcement {
            write!(f, " [TA]")?;
        }
        Ok(())
    }
}

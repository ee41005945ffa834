//! ID3 tags for finished MP3 recordings

use chrono::{DateTime, Datelike, Local};
use id3::{Tag, TagLike, Version};
use std::path::Path;

use crate::error::CaptureError;

const ALBUM: &str = "FM Recorder";

/// What a recording is tagged with
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingTags {
    /// Frequency label the file was named with ("96.8MHz")
    pub frequency_label: String,
    /// RDS station name at the time the recording stopped
    pub station_name: Option<String>,
    pub recorded_at: DateTime<Local>,
}

impl RecordingTags {
    pub fn title(&self) -> String {
        match &self.station_name {
            Some(name) => format!("{} ({})", name, self.frequency_label),
            None => format!("FM recording {}", self.frequency_label),
        }
    }

    pub fn artist(&self) -> &str {
        self.station_name.as_deref().unwrap_or(&self.frequency_label)
    }
}

/// Write an ID3v2.4 tag in front of the audio at `path`
pub fn write_tags(path: &Path, tags: &RecordingTags) -> Result<(), CaptureError> {
    let mut tag = Tag::new();
    tag.set_title(tags.title());
    tag.set_artist(tags.artist());
    tag.set_album(ALBUM);
    tag.set_year(tags.recorded_at.year());

    tag.write_to_path(path, Version::Id3v24).map_err(|e| {
        CaptureError::CaptureDeviceFailure(format!("Failed to tag {}: {}", path.display(), e))
    })
}

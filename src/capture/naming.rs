//! Recording file names
//!
//! The pattern's `{timestamp}` and `{frequency}` placeholders are rendered
//! first; the file is then created with `create_new`, adding a numeric
//! suffix until a free name is found.

use chrono::{DateTime, Local};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Upper bound on suffixes tried for one recording
const MAX_SUFFIX: u32 = 1000;

/// Known audio extensions stripped from the pattern before the encoder's is added
const AUDIO_EXTENSIONS: [&str; 2] = [".mp3", ".wav"];

/// Render the pattern into a file stem (no extension)
pub fn render_stem(pattern: &str, timestamp_format: &str, now: DateTime<Local>, label: &str) -> String {
    let timestamp = now.format(timestamp_format).to_string();
    let name = pattern
        .replace("{timestamp}", &timestamp)
        .replace("{frequency}", label)
        .replace(['/', '\\'], "_");

    // The label itself contains a dot ("100.5MHz"), so only known extensions go
    let lower = name.to_ascii_lowercase();
    match AUDIO_EXTENSIONS.iter().find(|ext| lower.ends_with(*ext)) {
        Some(ext) => name[..name.len() - ext.len()].to_string(),
        None => name,
    }
}

/// Create `<dir>/<stem>.<extension>`, or `<stem>_<n>.<extension>` when taken
pub fn create_output_file(dir: &Path, stem: &str, extension: &str) -> io::Result<(PathBuf, File)> {
    for suffix in 0..MAX_SUFFIX {
        let name = if suffix == 0 {
            format!("{}.{}", stem, extension)
        } else {
            format!("{}_{}.{}", stem, suffix, extension)
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free file name for {} in {}", stem, dir.display()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 17, 14, 3, 9).unwrap()
    }

    #[test]
    fn test_render_stem_placeholders() {
        let stem = render_stem(
            "radio_{frequency}_{timestamp}.mp3",
            "%Y%m%d_%H%M%S",
            fixed_time(),
            "100.5MHz",
        );
        assert_eq!(stem, "radio_100.5MHz_20240517_140309");
    }

    #[test]
    fn test_render_stem_keeps_unknown_suffix() {
        let stem = render_stem("{timestamp}_{frequency}", "%H%M", fixed_time(), "96.8MHz");
        assert_eq!(stem, "1403_96.8MHz");

        let stem = render_stem("rec/{timestamp}.WAV", "%H", fixed_time(), "x");
        assert_eq!(stem, "rec_14");
    }

    #[test]
    fn test_create_output_file_never_collides() {
        let dir = tempfile::tempdir().unwrap();
        let (first, _) = create_output_file(dir.path(), "radio", "wav").unwrap();
        let (second, _) = create_output_file(dir.path(), "radio", "wav").unwrap();
        let (third, _) = create_output_file(dir.path(), "radio", "wav").unwrap();

        assert_eq!(first.file_name().unwrap(), "radio.wav");
        assert_eq!(second.file_name().unwrap(), "radio_1.wav");
        assert_eq!(third.file_name().unwrap(), "radio_2.wav");
    }
}

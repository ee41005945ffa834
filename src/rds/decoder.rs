//! RDS group accumulation
//!
//! Station name and radiotext arrive a few characters per group, out of
//! order and with bit errors. The decoder places every usable fragment at
//! its offset and drops whatever no longer belongs to the current station:
//! on a PI change, on a radiotext A/B flip and when a kind of group has not
//! been seen for `stale_after_ticks` polls.

use chrono::{Days, NaiveDate};
use tracing::{debug, info};

use super::group::{GroupVersion, SidebandGroup};
use super::metadata::{ClockTime, ProgramContent, StationMetadata};

const NAME_LEN: usize = 8;
const NAME_SEGMENTS: usize = NAME_LEN / 2;
const TEXT_LEN_A: usize = 64;
const TEXT_LEN_B: usize = 32;
const MAX_ALTERNATIVE_FREQUENCIES: usize = 25;
const TEXT_TERMINATOR: u8 = 0x0D;

/// Display character for an RDS byte; anything outside printable ASCII is a blank
fn rds_char(byte: u8) -> char {
    if (0x20..=0x7E).contains(&byte) {
        byte as char
    } else {
        ' '
    }
}

/// AF code 1..=204 maps to 87.6..=107.9 MHz; other codes are fillers or counts
fn af_frequency(code: u8) -> Option<f64> {
    match code {
        1..=204 => Some((87_600 + (code as u32 - 1) * 100) as f64 / 1000.0),
        _ => None,
    }
}

fn render(slots: &[Option<char>]) -> Option<String> {
    if slots.iter().all(Option::is_none) {
        return None;
    }
    let text: String = slots.iter().map(|c| c.unwrap_or(' ')).collect();
    let trimmed = text.trim_end();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// 4A: Modified Julian Day, UTC hour/minute and a signed half-hour offset
fn decode_clock(group: &SidebandGroup) -> Option<ClockTime> {
    let b = group.b() as u32;
    let c = group.c() as u32;
    let d = group.d() as u32;

    let mjd = ((b & 0x3) << 15) | (c >> 1);
    let hour = ((c & 0x1) << 4) | (d >> 12);
    let minute = (d >> 6) & 0x3F;
    let half_hours = (d & 0x1F) as i32;
    let sign = if d & 0x20 != 0 { -1 } else { 1 };

    if mjd == 0 {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(1858, 11, 17)?.checked_add_days(Days::new(mjd as u64))?;
    let utc = date.and_hms_opt(hour, minute, 0)?.and_utc();
    Some(ClockTime {
        utc,
        offset_minutes: sign * half_hours * 30,
    })
}

/// Stateful RDS accumulator
pub struct SidebandDecoder {
    stale_after_ticks: u32,

    pi: Option<u16>,
    program_type: Option<u8>,
    traffic_program: bool,
    traffic_announcement: bool,
    content: Option<ProgramContent>,

    name: [Option<char>; NAME_LEN],
    name_segments: [bool; NAME_SEGMENTS],

    text: [Option<char>; TEXT_LEN_A],
    text_flag: Option<bool>,
    text_version: Option<GroupVersion>,
    /// Position of the carriage return, if received
    text_end: Option<usize>,

    alternative_frequencies: Vec<f64>,
    clock: Option<ClockTime>,

    ticks_since_name: u32,
    ticks_since_text: u32,
    ticks_since_group: u32,

    accepted: u64,
    rejected: u64,
}

impl SidebandDecoder {
    pub fn new(stale_after_ticks: u32) -> Self {
        Self {
            stale_after_ticks,
            pi: None,
            program_type: None,
            traffic_program: false,
            traffic_announcement: false,
            content: None,
            name: [None; NAME_LEN],
            name_segments: [false; NAME_SEGMENTS],
            text: [None; TEXT_LEN_A],
            text_flag: None,
            text_version: None,
            text_end: None,
            alternative_frequencies: Vec::new(),
            clock: None,
            ticks_since_name: 0,
            ticks_since_text: 0,
            ticks_since_group: 0,
            accepted: 0,
            rejected: 0,
        }
    }

    /// Feed one group. Returns false when the group was discarded.
    pub fn process(&mut self, group: &SidebandGroup) -> bool {
        if !group.header_valid() {
            self.rejected += 1;
            debug!(
                "Discarding RDS group, header uncorrectable (errors {:?})",
                group.errors
            );
            return false;
        }

        let pi = group.pi();
        if self.pi.is_some_and(|current| current != pi) {
            debug!("PI changed {:04X} -> {:04X}, clearing station data", self.pi.unwrap_or(0), pi);
            self.clear_station_data();
        }
        self.pi = Some(pi);
        self.program_type = Some(group.pty());
        self.traffic_program = group.traffic_program();
        self.ticks_since_group = 0;

        let kind = group.group_type();
        match kind.code {
            0 => self.apply_basic_tuning(group, kind.version),
            2 => self.apply_radiotext(group, kind.version),
            4 if kind.version == GroupVersion::A => self.apply_clock(group),
            _ => {}
        }

        self.accepted += 1;
        debug!("RDS group {} accepted (PI {:04X})", kind, pi);
        true
    }

    /// Advance the staleness counters by one poll.
    /// Returns true when anything was cleared.
    pub fn tick(&mut self) -> bool {
        self.ticks_since_name = self.ticks_since_name.saturating_add(1);
        self.ticks_since_text = self.ticks_since_text.saturating_add(1);
        self.ticks_since_group = self.ticks_since_group.saturating_add(1);

        if self.ticks_since_group >= self.stale_after_ticks && !self.is_empty() {
            debug!("No RDS groups for {} polls, clearing metadata", self.ticks_since_group);
            self.reset();
            return true;
        }

        let mut expired = false;
        if self.ticks_since_name >= self.stale_after_ticks && self.name.iter().any(Option::is_some) {
            debug!("Station name stale, clearing");
            self.clear_name();
            expired = true;
        }
        if self.ticks_since_text >= self.stale_after_ticks && self.text.iter().any(Option::is_some) {
            debug!("Radiotext stale, clearing");
            self.clear_text();
            expired = true;
        }
        expired
    }

    /// Drop everything accumulated; counters are kept
    pub fn reset(&mut self) {
        self.clear_station_data();
        self.pi = None;
        self.program_type = None;
        self.traffic_program = false;
        self.ticks_since_name = 0;
        self.ticks_since_text = 0;
        self.ticks_since_group = 0;
    }

    pub fn snapshot(&self) -> StationMetadata {
        let text_len = match self.text_version {
            Some(GroupVersion::B) => TEXT_LEN_B,
            _ => TEXT_LEN_A,
        };
        let text_end = self.text_end.unwrap_or(text_len).min(text_len);

        StationMetadata {
            pi: self.pi,
            program_type: self.program_type,
            station_name: render(&self.name),
            station_name_complete: self.name_segments.iter().all(|s| *s),
            radiotext: render(&self.text[..text_end]),
            traffic_program: self.traffic_program,
            traffic_announcement: self.traffic_announcement,
            content: self.content,
            alternative_frequencies: self.alternative_frequencies.clone(),
            clock: self.clock,
        }
    }

    pub fn accepted(&self) -> u64 {
        self.accepted
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    fn is_empty(&self) -> bool {
        self.pi.is_none()
            && self.name.iter().all(Option::is_none)
            && self.text.iter().all(Option::is_none)
            && self.alternative_frequencies.is_empty()
            && self.clock.is_none()
    }

    fn clear_name(&mut self) {
        self.name = [None; NAME_LEN];
        self.name_segments = [false; NAME_SEGMENTS];
    }

    fn clear_text(&mut self) {
        self.text = [None; TEXT_LEN_A];
        self.text_flag = None;
        self.text_version = None;
        self.text_end = None;
    }

    /// Everything that belongs to one station, except the header fields
    fn clear_station_data(&mut self) {
        self.clear_name();
        self.clear_text();
        self.traffic_announcement = false;
        self.content = None;
        self.alternative_frequencies.clear();
        self.clock = None;
    }

    /// 0A/0B: two name characters in block D, flags in block B, AF codes in 0A block C
    fn apply_basic_tuning(&mut self, group: &SidebandGroup, version: GroupVersion) {
        let b = group.b();
        self.ticks_since_name = 0;
        self.traffic_announcement = b & 0x0010 != 0;
        self.content = Some(if b & 0x0008 != 0 {
            ProgramContent::Music
        } else {
            ProgramContent::Speech
        });

        if version == GroupVersion::A && group.c_valid() {
            let [af1, af2] = group.c().to_be_bytes();
            for freq in [af1, af2].into_iter().filter_map(af_frequency) {
                if self.alternative_frequencies.len() < MAX_ALTERNATIVE_FREQUENCIES
                    && !self.alternative_frequencies.contains(&freq)
                {
                    self.alternative_frequencies.push(freq);
                }
            }
        }

        if !group.d_valid() {
            return;
        }
        let segment = (b & 0x3) as usize;
        let [hi, lo] = group.d().to_be_bytes();
        let was_complete = self.name_segments.iter().all(|s| *s);
        self.name[segment * 2] = Some(rds_char(hi));
        self.name[segment * 2 + 1] = Some(rds_char(lo));
        self.name_segments[segment] = true;

        if !was_complete && self.name_segments.iter().all(|s| *s) {
            if let Some(name) = render(&self.name) {
                info!("Station name: {}", name);
            }
        }
    }

    /// 2A: four characters from C and D; 2B: two characters from D
    fn apply_radiotext(&mut self, group: &SidebandGroup, version: GroupVersion) {
        let b = group.b();
        let flag = b & 0x0010 != 0;
        let flipped = self.text_flag.is_some_and(|f| f != flag)
            || self.text_version.is_some_and(|v| v != version);
        if flipped {
            debug!("Radiotext A/B flag changed, clearing text");
            self.clear_text();
        }
        self.text_flag = Some(flag);
        self.text_version = Some(version);
        self.ticks_since_text = 0;

        let segment = (b & 0x0F) as usize;
        let [c_hi, c_lo] = group.c().to_be_bytes();
        let [d_hi, d_lo] = group.d().to_be_bytes();
        let had_end = self.text_end.is_some();

        match version {
            GroupVersion::A => {
                let offset = segment * 4;
                if group.c_valid() {
                    self.put_text_byte(offset, c_hi);
                    self.put_text_byte(offset + 1, c_lo);
                }
                if group.d_valid() {
                    self.put_text_byte(offset + 2, d_hi);
                    self.put_text_byte(offset + 3, d_lo);
                }
            }
            GroupVersion::B => {
                let offset = segment * 2;
                if group.d_valid() {
                    self.put_text_byte(offset, d_hi);
                    self.put_text_byte(offset + 1, d_lo);
                }
            }
        }

        if !had_end && self.text_end.is_some() {
            if let Some(text) = self.snapshot().radiotext {
                info!("Radiotext: {}", text);
            }
        }
    }

    fn put_text_byte(&mut self, pos: usize, byte: u8) {
        if pos >= TEXT_LEN_A {
            return;
        }
        if byte == TEXT_TERMINATOR {
            self.text_end = Some(self.text_end.map_or(pos, |end| end.min(pos)));
            self.text[pos] = Some(' ');
        } else {
            self.text[pos] = Some(rds_char(byte));
        }
    }

    fn apply_clock(&mut self, group: &SidebandGroup) {
        if !(group.c_valid() && group.d_valid()) {
            return;
        }
        match decode_clock(group) {
            Some(clock) => {
                debug!("RDS clock: {} UTC (offset {} min)", clock.utc, clock.offset_minutes);
                self.clock = Some(clock);
            }
            None => debug!("Ignoring invalid RDS clock time"),
        }
    }
}

//! Si4703 register map and shadow register image
//!
//! The chip exposes sixteen 16-bit registers. Over I2C it has no register
//! pointer: reads always start at STATUSRSSI (0x0A) and wrap around through
//! 0x0F and 0x00..0x09, writes always start at POWERCFG (0x02).

pub const DEVICEID: usize = 0x00;
pub const CHIPID: usize = 0x01;
pub const POWERCFG: usize = 0x02;
pub const CHANNEL: usize = 0x03;
pub const SYSCONFIG1: usize = 0x04;
pub const SYSCONFIG2: usize = 0x05;
pub const SYSCONFIG3: usize = 0x06;
pub const TEST1: usize = 0x07;
pub const STATUSRSSI: usize = 0x0A;
pub const READCHAN: usize = 0x0B;
pub const RDSA: usize = 0x0C;
pub const RDSB: usize = 0x0D;
pub const RDSC: usize = 0x0E;
pub const RDSD: usize = 0x0F;

pub const REGISTER_COUNT: usize = 16;

/// First register of every read transaction
pub const READ_START: usize = STATUSRSSI;
/// First register of every write transaction
pub const WRITE_START: usize = POWERCFG;
/// Last register a write transaction transmits
pub const WRITE_END: usize = TEST1;

/// Expected DEVICEID high byte (part number / manufacturer prefix)
pub const DEVICE_ID_MASK: u16 = 0xFF00;
pub const DEVICE_ID_SI4703: u16 = 0x1200;

// POWERCFG
pub const POWERCFG_DSMUTE: u16 = 1 << 15;
pub const POWERCFG_DMUTE: u16 = 1 << 14;
pub const POWERCFG_RDSM: u16 = 1 << 11;
pub const POWERCFG_SKMODE: u16 = 1 << 10;
pub const POWERCFG_SEEKUP: u16 = 1 << 9;
pub const POWERCFG_SEEK: u16 = 1 << 8;
pub const POWERCFG_DISABLE: u16 = 1 << 6;
pub const POWERCFG_ENABLE: u16 = 1 << 0;

// CHANNEL
pub const CHANNEL_TUNE: u16 = 1 << 15;
pub const CHANNEL_MASK: u16 = 0x03FF;

// SYSCONFIG1
pub const SYSCONFIG1_RDS: u16 = 1 << 12;
pub const SYSCONFIG1_DE: u16 = 1 << 11;

// SYSCONFIG2
pub const SYSCONFIG2_SEEKTH_SHIFT: u16 = 8;
pub const SYSCONFIG2_BAND_SHIFT: u16 = 6;
pub const SYSCONFIG2_SPACE_SHIFT: u16 = 4;
pub const SYSCONFIG2_VOLUME_MASK: u16 = 0x000F;

// SYSCONFIG3
pub const SYSCONFIG3_VOLEXT: u16 = 1 << 8;
pub const SYSCONFIG3_SKSNR_SHIFT: u16 = 4;

// TEST1
pub const TEST1_XOSCEN: u16 = 1 << 15;

// STATUSRSSI
pub const STATUS_RDSR: u16 = 1 << 15;
pub const STATUS_STC: u16 = 1 << 14;
pub const STATUS_SFBL: u16 = 1 << 13;
pub const STATUS_ST: u16 = 1 << 8;
pub const STATUS_BLERA_SHIFT: u16 = 9;
pub const STATUS_RSSI_MASK: u16 = 0x00FF;

// READCHAN
pub const READCHAN_BLERB_SHIFT: u16 = 14;
pub const READCHAN_BLERC_SHIFT: u16 = 12;
pub const READCHAN_BLERD_SHIFT: u16 = 10;

/// Number of bytes in a full read transaction
pub const READ_LEN: usize = REGISTER_COUNT * 2;
/// Number of bytes in a write transaction (0x02..=0x07)
pub const WRITE_LEN: usize = (WRITE_END - WRITE_START + 1) * 2;

/// Shadow copy of the chip registers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegisterImage {
    regs: [u16; REGISTER_COUNT],
}

impl RegisterImage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, reg: usize) -> u16 {
        self.regs[reg]
    }

    pub fn set(&mut self, reg: usize, value: u16) {
        self.regs[reg] = value;
    }

    /// Set or clear `mask` in `reg`
    pub fn set_bits(&mut self, reg: usize, mask: u16, on: bool) {
        if on {
            self.regs[reg] |= mask;
        } else {
            self.regs[reg] &= !mask;
        }
    }

    /// Replace the bits selected by `mask` with `value << shift`
    pub fn set_field(&mut self, reg: usize, mask: u16, shift: u16, value: u16) {
        self.regs[reg] = (self.regs[reg] & !mask) | ((value << shift) & mask);
    }

    /// Decode a read transaction (registers 0x0A..0x0F then 0x00..0x09, big-endian)
    pub fn from_read_bytes(bytes: &[u8; READ_LEN]) -> Self {
        let mut image = Self::new();
        for (i, pair) in bytes.chunks_exact(2).enumerate() {
            let reg = (READ_START + i) % REGISTER_COUNT;
            image.regs[reg] = u16::from_be_bytes([pair[0], pair[1]]);
        }
        image
    }

    /// Encode the writable block (registers 0x02..=0x07, big-endian, in order)
    pub fn to_write_bytes(&self) -> [u8; WRITE_LEN] {
        let mut out = [0u8; WRITE_LEN];
        for (i, reg) in (WRITE_START..=WRITE_END).enumerate() {
            let [hi, lo] = self.regs[reg].to_be_bytes();
            out[i * 2] = hi;
            out[i * 2 + 1] = lo;
        }
        out
    }

    pub fn channel(&self) -> u16 {
        self.regs[READCHAN] & CHANNEL_MASK
    }

    pub fn rssi(&self) -> u8 {
        (self.regs[STATUSRSSI] & STATUS_RSSI_MASK) as u8
    }

    pub fn stc(&self) -> bool {
        self.regs[STATUSRSSI] & STATUS_STC != 0
    }

    pub fn sf_bl(&self) -> bool {
        self.regs[STATUSRSSI] & STATUS_SFBL != 0
    }

    pub fn stereo(&self) -> bool {
        self.regs[STATUSRSSI] & STATUS_ST != 0
    }

    pub fn rds_ready(&self) -> bool {
        self.regs[STATUSRSSI] & STATUS_RDSR != 0
    }

    /// Raw 2-bit block error levels for RDS blocks A..D
    pub fn block_errors(&self) -> [u8; 4] {
        let status = self.regs[STATUSRSSI];
        let readchan = self.regs[READCHAN];
        [
            ((status >> STATUS_BLERA_SHIFT) & 0x3) as u8,
            ((readchan >> READCHAN_BLERB_SHIFT) & 0x3) as u8,
            ((readchan >> READCHAN_BLERC_SHIFT) & 0x3) as u8,
            ((readchan >> READCHAN_BLERD_SHIFT) & 0x3) as u8,
        ]
    }

    pub fn rds_blocks(&self) -> [u16; 4] {
        [self.regs[RDSA], self.regs[RDSB], self.regs[RDSC], self.regs[RDSD]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bytes_wrap_from_statusrssi() {
        let mut bytes = [0u8; READ_LEN];
        // first word is STATUSRSSI, seventh word is DEVICEID
        bytes[0] = 0x40;
        bytes[1] = 0x2A;
        bytes[12] = 0x12;
        bytes[13] = 0x42;
        let image = RegisterImage::from_read_bytes(&bytes);
        assert_eq!(image.get(STATUSRSSI), 0x402A);
        assert_eq!(image.get(DEVICEID), 0x1242);
        assert!(image.stc());
        assert_eq!(image.rssi(), 0x2A);
    }

    #[test]
    fn test_write_bytes_start_at_powercfg() {
        let mut image = RegisterImage::new();
        image.set(POWERCFG, 0x4001);
        image.set(CHANNEL, 0x8000 | 130);
        image.set(TEST1, TEST1_XOSCEN);
        image.set(STATUSRSSI, 0xFFFF); // never written

        let bytes = image.to_write_bytes();
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[0..2], &[0x40, 0x01]);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 0x8000 | 130);
        assert_eq!(&bytes[10..12], &[0x80, 0x00]);
    }

    #[test]
    fn test_set_field_masks_value() {
        let mut image = RegisterImage::new();
        image.set(SYSCONFIG2, 0xFFF0);
        image.set_field(SYSCONFIG2, SYSCONFIG2_VOLUME_MASK, 0, 0x1F);
        assert_eq!(image.get(SYSCONFIG2), 0xFFFF);
        image.set_field(SYSCONFIG2, SYSCONFIG2_VOLUME_MASK, 0, 3);
        assert_eq!(image.get(SYSCONFIG2), 0xFFF3);
    }

    #[test]
    fn test_block_errors_decode() {
        let mut image = RegisterImage::new();
        image.set(STATUSRSSI, 3 << STATUS_BLERA_SHIFT);
        image.set(READCHAN, (1 << READCHAN_BLERB_SHIFT) | (2 << READCHAN_BLERC_SHIFT) | 42);
        assert_eq!(image.block_errors(), [3, 1, 2, 0]);
        assert_eq!(image.channel(), 42);
    }
}

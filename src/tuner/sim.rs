//! In-memory Si4703 for tests
//!
//! Models the register file, the TUNE/SEEK/STC handshake over a station
//! list, the RDS group FIFO and bus failure injection. Shared behind an
//! `Arc<Mutex<_>>` so tests can inspect the chip after handing the bus to
//! a driver.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin};
use embedded_hal::i2c::{self, ErrorKind, I2c, NoAcknowledgeSource, Operation};

use super::bus::{Si4703Bus, SI4703_I2C_ADDR};
use super::registers::*;

/// RSSI reported on channels without a listed station
const NOISE_RSSI: u8 = 5;
const STEREO_RSSI: u8 = 30;

pub type SimBus = Si4703Bus<SimI2c, SimPin, SimPin, NoDelay>;

#[derive(Debug)]
pub struct ChipModel {
    pub regs: [u16; REGISTER_COUNT],
    /// Answers the bus at all
    pub present: bool,
    /// Reject the next write transaction
    pub fail_next_write: bool,
    /// STC never rises
    pub never_complete: bool,
    /// (channel, rssi)
    pub stations: Vec<(u16, u8)>,
    /// Groups delivered one per read: blocks and 2-bit error levels
    pub rds_queue: VecDeque<([u16; 4], [u8; 4])>,
    pub writes: Vec<Vec<u8>>,
    pub reads: usize,
    pub pin_log: Vec<(&'static str, bool)>,
    stc_pending: bool,
}

impl ChipModel {
    fn new() -> Self {
        let mut regs = [0u16; REGISTER_COUNT];
        regs[DEVICEID] = 0x1242;
        regs[CHIPID] = 0x1253;
        regs[TEST1] = 0x0100;
        Self {
            regs,
            present: true,
            fail_next_write: false,
            never_complete: false,
            stations: Vec::new(),
            rds_queue: VecDeque::new(),
            writes: Vec::new(),
            reads: 0,
            pin_log: Vec::new(),
            stc_pending: false,
        }
    }

    fn rssi_at(&self, channel: u16) -> u8 {
        self.stations
            .iter()
            .find(|(ch, _)| *ch == channel)
            .map(|(_, rssi)| *rssi)
            .unwrap_or(NOISE_RSSI)
    }

    fn max_channel(&self) -> u16 {
        let sysconfig2 = self.regs[SYSCONFIG2];
        let (low, high) = match (sysconfig2 >> SYSCONFIG2_BAND_SHIFT) & 0x3 {
            0 => (87_500u32, 108_000u32),
            2 => (76_000, 90_000),
            _ => (76_000, 108_000),
        };
        let space = match (sysconfig2 >> SYSCONFIG2_SPACE_SHIFT) & 0x3 {
            0 => 200u32,
            1 => 100,
            _ => 50,
        };
        ((high - low) / space) as u16
    }

    fn settle_on(&mut self, channel: u16, band_limit: bool) {
        let rssi = self.rssi_at(channel);
        self.regs[READCHAN] = (self.regs[READCHAN] & !CHANNEL_MASK) | channel;
        let mut status = self.regs[STATUSRSSI] & !(STATUS_RSSI_MASK | STATUS_SFBL | STATUS_ST);
        status |= rssi as u16;
        if band_limit {
            status |= STATUS_SFBL;
        }
        if rssi >= STEREO_RSSI {
            status |= STATUS_ST;
        }
        self.regs[STATUSRSSI] = status;
        self.stc_pending = true;
    }

    fn start_seek(&mut self) {
        let powercfg = self.regs[POWERCFG];
        let up = powercfg & POWERCFG_SEEKUP != 0;
        let threshold = (self.regs[SYSCONFIG2] >> SYSCONFIG2_SEEKTH_SHIFT) as u8;
        let max = self.max_channel();
        let mut channel = self.regs[READCHAN] & CHANNEL_MASK;

        loop {
            let at_edge = if up { channel >= max } else { channel == 0 };
            if at_edge {
                self.settle_on(channel, true);
                return;
            }
            channel = if up { channel + 1 } else { channel - 1 };
            if self.rssi_at(channel) >= threshold {
                self.settle_on(channel, false);
                return;
            }
        }
    }

    fn end_operation(&mut self) {
        self.stc_pending = false;
        self.regs[STATUSRSSI] &= !(STATUS_STC | STATUS_SFBL);
    }

    fn apply_write(&mut self, bytes: &[u8]) {
        let before = self.regs;
        for (i, pair) in bytes.chunks_exact(2).enumerate() {
            let reg = WRITE_START + i;
            if reg > WRITE_END {
                break;
            }
            self.regs[reg] = u16::from_be_bytes([pair[0], pair[1]]);
        }

        let tune_before = before[CHANNEL] & CHANNEL_TUNE != 0;
        let tune_after = self.regs[CHANNEL] & CHANNEL_TUNE != 0;
        if tune_after && !tune_before {
            self.settle_on(self.regs[CHANNEL] & CHANNEL_MASK, false);
        } else if tune_before && !tune_after {
            self.end_operation();
        }

        let seek_before = before[POWERCFG] & POWERCFG_SEEK != 0;
        let seek_after = self.regs[POWERCFG] & POWERCFG_SEEK != 0;
        if seek_after && !seek_before {
            self.start_seek();
        } else if seek_before && !seek_after {
            self.end_operation();
        }
    }

    fn fill_read(&mut self, buf: &mut [u8]) {
        self.reads += 1;

        if self.stc_pending && !self.never_complete {
            self.regs[STATUSRSSI] |= STATUS_STC;
        }

        let enabled = self.regs[POWERCFG] & POWERCFG_ENABLE != 0
            && self.regs[POWERCFG] & POWERCFG_DISABLE == 0;
        match self.rds_queue.pop_front().filter(|_| enabled) {
            Some((blocks, errors)) => {
                self.regs[RDSA] = blocks[0];
                self.regs[RDSB] = blocks[1];
                self.regs[RDSC] = blocks[2];
                self.regs[RDSD] = blocks[3];
                let status = self.regs[STATUSRSSI] & !(0x3 << STATUS_BLERA_SHIFT);
                self.regs[STATUSRSSI] =
                    status | STATUS_RDSR | ((errors[0] as u16 & 0x3) << STATUS_BLERA_SHIFT);
                self.regs[READCHAN] = (self.regs[READCHAN] & CHANNEL_MASK)
                    | ((errors[1] as u16 & 0x3) << READCHAN_BLERB_SHIFT)
                    | ((errors[2] as u16 & 0x3) << READCHAN_BLERC_SHIFT)
                    | ((errors[3] as u16 & 0x3) << READCHAN_BLERD_SHIFT);
            }
            None => self.regs[STATUSRSSI] &= !STATUS_RDSR,
        }

        for (i, pair) in buf.chunks_exact_mut(2).enumerate() {
            let reg = (READ_START + i) % REGISTER_COUNT;
            pair.copy_from_slice(&self.regs[reg].to_be_bytes());
        }
    }
}

/// Handle to the shared chip model
#[derive(Clone)]
pub struct SimulatedChip {
    model: Arc<Mutex<ChipModel>>,
}

impl SimulatedChip {
    pub fn new() -> Self {
        Self {
            model: Arc::new(Mutex::new(ChipModel::new())),
        }
    }

    pub fn model(&self) -> MutexGuard<'_, ChipModel> {
        self.model.lock().unwrap()
    }

    /// A fresh transport wired to this chip
    pub fn bus(&self) -> SimBus {
        Si4703Bus::new(
            SimI2c {
                model: self.model.clone(),
            },
            SI4703_I2C_ADDR,
            SimPin {
                name: "rst",
                model: self.model.clone(),
            },
            SimPin {
                name: "sdio",
                model: self.model.clone(),
            },
            NoDelay,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimI2cError;

impl i2c::Error for SimI2cError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
    }
}

pub struct SimI2c {
    model: Arc<Mutex<ChipModel>>,
}

impl i2c::ErrorType for SimI2c {
    type Error = SimI2cError;
}

impl I2c for SimI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut model = self.model.lock().unwrap();
        if !model.present || address != SI4703_I2C_ADDR {
            return Err(SimI2cError);
        }
        for op in operations {
            match op {
                Operation::Read(buf) => model.fill_read(buf),
                Operation::Write(bytes) => {
                    if model.fail_next_write {
                        model.fail_next_write = false;
                        return Err(SimI2cError);
                    }
                    model.writes.push(bytes.to_vec());
                    model.apply_write(bytes);
                }
            }
        }
        Ok(())
    }
}

/// Control line that records its transitions in the chip model
pub struct SimPin {
    name: &'static str,
    model: Arc<Mutex<ChipModel>>,
}

impl PinErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.model.lock().unwrap().pin_log.push((self.name, false));
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.model.lock().unwrap().pin_log.push((self.name, true));
        Ok(())
    }
}

pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

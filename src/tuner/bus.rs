//! Exclusive-access bus transport for the tuner chip
//!
//! Wraps the I2C channel and the two control lines (RST, SDIO) used by the
//! reset/mode-select sequence. Generic over the `embedded-hal` 1.0 traits so
//! the same driver runs on a Raspberry Pi and against the simulated chip.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::I2c;
use thiserror::Error;
use tracing::trace;

use super::registers::{RegisterImage, READ_LEN};

/// Default 7-bit address of the Si4703
pub const SI4703_I2C_ADDR: u8 = 0x10;

/// A failed bus or control line transaction
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    #[error("i2c transaction failed: {0}")]
    I2c(String),
    #[error("control line failed: {0}")]
    Pin(String),
}

/// Register-block access plus the reset control lines
pub trait BusTransport {
    /// Read all sixteen registers in one transaction
    fn read_image(&mut self) -> Result<RegisterImage, BusError>;

    /// Write registers 0x02..=0x07 in one transaction
    fn write_image(&mut self, image: &RegisterImage) -> Result<(), BusError>;

    /// Drive RST and SDIO low (chip held in reset)
    fn hold_reset(&mut self) -> Result<(), BusError>;

    /// Raise RST while SDIO is low, latching 2-wire (I2C) mode
    fn select_two_wire_mode(&mut self) -> Result<(), BusError>;

    fn delay_ms(&mut self, ms: u32);
}

/// Si4703 transport over `embedded-hal` I2C, pins and delay
pub struct Si4703Bus<I, RST, SDIO, D> {
    i2c: I,
    address: u8,
    reset: RST,
    /// Released after mode selection so the line can return to SDA duty
    sdio: Option<SDIO>,
    delay: D,
}

impl<I, RST, SDIO, D> Si4703Bus<I, RST, SDIO, D>
where
    I: I2c,
    RST: OutputPin,
    SDIO: OutputPin,
    D: DelayNs,
{
    pub fn new(i2c: I, address: u8, reset: RST, sdio: SDIO, delay: D) -> Self {
        Self {
            i2c,
            address,
            reset,
            sdio: Some(sdio),
            delay,
        }
    }
}

impl<I, RST, SDIO, D> BusTransport for Si4703Bus<I, RST, SDIO, D>
where
    I: I2c,
    RST: OutputPin,
    SDIO: OutputPin,
    D: DelayNs,
{
    fn read_image(&mut self) -> Result<RegisterImage, BusError> {
        let mut bytes = [0u8; READ_LEN];
        self.i2c
            .read(self.address, &mut bytes)
            .map_err(|e| BusError::I2c(format!("read from 0x{:02X}: {:?}", self.address, e)))?;
        trace!("Read register image ({} bytes)", bytes.len());
        Ok(RegisterImage::from_read_bytes(&bytes))
    }

    fn write_image(&mut self, image: &RegisterImage) -> Result<(), BusError> {
        let bytes = image.to_write_bytes();
        self.i2c
            .write(self.address, &bytes)
            .map_err(|e| BusError::I2c(format!("write to 0x{:02X}: {:?}", self.address, e)))?;
        trace!("Wrote registers 0x02-0x07");
        Ok(())
    }

    fn hold_reset(&mut self) -> Result<(), BusError> {
        if let Some(sdio) = self.sdio.as_mut() {
            sdio.set_low()
                .map_err(|e| BusError::Pin(format!("SDIO low: {:?}", e)))?;
        }
        self.reset
            .set_low()
            .map_err(|e| BusError::Pin(format!("RST low: {:?}", e)))
    }

    fn select_two_wire_mode(&mut self) -> Result<(), BusError> {
        self.reset
            .set_high()
            .map_err(|e| BusError::Pin(format!("RST high: {:?}", e)))?;
        // Mode is latched on the RST edge; hand SDIO back to the bus
        self.sdio = None;
        Ok(())
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }
}

//! Raspberry Pi I2C and GPIO through `rpi_embedded`

use embedded_hal::digital::{self, ErrorType as PinErrorType, OutputPin};
use embedded_hal::i2c::{self, ErrorKind, I2c, Operation};
use rpi_embedded::gpio::{Gpio, OutputPin as GpioOutput};
use rpi_embedded::i2c::I2c as PiI2c;
use tracing::info;

use crate::config::HardwareConfig;
use crate::error::TunerError;
use crate::tuner::Si4703Bus;

use super::StdDelay;

pub type PiBus = Si4703Bus<PiI2cBus, PiPin, PiPin, StdDelay>;

#[derive(Debug)]
pub struct PiError(String);

impl i2c::Error for PiError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

impl digital::Error for PiError {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

/// `/dev/i2c-N`; the slave address is re-selected when it changes
pub struct PiI2cBus {
    i2c: PiI2c,
    address: Option<u8>,
}

impl PiI2cBus {
    fn select(&mut self, address: u8) -> Result<(), PiError> {
        if self.address != Some(address) {
            self.i2c
                .set_slave_address(address as u16)
                .map_err(|e| PiError(e.to_string()))?;
            self.address = Some(address);
        }
        Ok(())
    }
}

impl i2c::ErrorType for PiI2cBus {
    type Error = PiError;
}

impl I2c for PiI2cBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        self.select(address)?;
        for op in operations {
            match op {
                Operation::Read(buf) => {
                    let n = self.i2c.read(buf).map_err(|e| PiError(e.to_string()))?;
                    if n != buf.len() {
                        return Err(PiError(format!("short read: {} of {} bytes", n, buf.len())));
                    }
                }
                Operation::Write(bytes) => {
                    let n = self.i2c.write(bytes).map_err(|e| PiError(e.to_string()))?;
                    if n != bytes.len() {
                        return Err(PiError(format!("short write: {} of {} bytes", n, bytes.len())));
                    }
                }
            }
        }
        Ok(())
    }
}

pub struct PiPin(GpioOutput);

impl PinErrorType for PiPin {
    type Error = PiError;
}

impl OutputPin for PiPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_high();
        Ok(())
    }
}

fn unavailable(context: &str, err: impl std::fmt::Display) -> TunerError {
    TunerError::HardwareUnavailable(format!("{}: {}", context, err))
}

/// Open the I2C bus and claim the reset/SDIO lines
pub fn build_bus(hardware: &HardwareConfig) -> Result<PiBus, TunerError> {
    let i2c = PiI2c::with_bus(hardware.i2c_bus)
        .map_err(|e| unavailable(&format!("open /dev/i2c-{}", hardware.i2c_bus), e))?;
    let gpio = Gpio::new().map_err(|e| unavailable("open GPIO", e))?;
    let reset = gpio
        .get(hardware.reset_pin)
        .map_err(|e| unavailable(&format!("claim RST pin {}", hardware.reset_pin), e))?
        .into_output();
    let sdio = gpio
        .get(hardware.sdio_pin)
        .map_err(|e| unavailable(&format!("claim SDIO pin {}", hardware.sdio_pin), e))?
        .into_output();

    info!(
        "Si4703 on /dev/i2c-{} at 0x{:02X} (RST {}, SDIO {})",
        hardware.i2c_bus, hardware.i2c_address, hardware.reset_pin, hardware.sdio_pin
    );

    Ok(Si4703Bus::new(
        PiI2cBus { i2c, address: None },
        hardware.i2c_address,
        PiPin(reset),
        PiPin(sdio),
        StdDelay,
    ))
}

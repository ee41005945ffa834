//! Platform glue for the `embedded-hal` traits the tuner bus is generic over

#[cfg(feature = "rpi")]
pub mod rpi;

use embedded_hal::delay::DelayNs;
use std::time::Duration;

use crate::tuner::registers::RegisterImage;
use crate::tuner::{BusError, BusTransport};

/// Blocking delay on the calling thread
#[derive(Debug, Default, Clone, Copy)]
pub struct StdDelay;

impl DelayNs for StdDelay {
    fn delay_ns(&mut self, ns: u32) {
        std::thread::sleep(Duration::from_nanos(ns as u64));
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(ms as u64));
    }
}

/// Transport for builds without a hardware backend; every transaction fails
#[derive(Debug, Default, Clone, Copy)]
pub struct AbsentBus;

impl AbsentBus {
    fn absent() -> BusError {
        BusError::I2c("no tuner backend compiled in".to_string())
    }
}

impl BusTransport for AbsentBus {
    fn read_image(&mut self) -> Result<RegisterImage, BusError> {
        Err(Self::absent())
    }

    fn write_image(&mut self, _image: &RegisterImage) -> Result<(), BusError> {
        Err(Self::absent())
    }

    fn hold_reset(&mut self) -> Result<(), BusError> {
        Err(Self::absent())
    }

    fn select_two_wire_mode(&mut self) -> Result<(), BusError> {
        Err(Self::absent())
    }

    fn delay_ms(&mut self, _ms: u32) {}
}

//! Si4703 FM tuner: register map, bus transport and driver

pub mod bus;
pub mod driver;
pub mod registers;

#[cfg(test)]
pub mod sim;

pub use bus::{BusError, BusTransport, Si4703Bus, SI4703_I2C_ADDR};
pub use driver::{SeekDirection, TunerDriver, TunerSettings, TunerState, TunerStatus};

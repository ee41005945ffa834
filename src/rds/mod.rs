//! RDS sideband decoding
//!
//! Turns the chip's 4-block groups into station metadata:
//! 1. Validate block error levels (`group`)
//! 2. Place name/text fragments, flags, AF list and clock (`decoder`)
//! 3. Publish owned snapshots (`metadata`)

pub mod decoder;
pub mod group;
pub mod metadata;

pub use decoder::SidebandDecoder;
pub use group::{BlockError, GroupType, GroupVersion, SidebandGroup};
pub use metadata::{pty_name, ClockTime, ProgramContent, StationMetadata};

//! Radio session
//!
//! 1. `RadioSession` runs on its own thread and owns the tuner, RDS decoder
//!    and capture pipeline, so operations never interleave
//! 2. `SessionHandle` sends commands and awaits replies from async code
//! 3. Station metadata is published through a watch channel on every change

pub mod handle;
pub mod manager;
pub mod state;

pub use handle::{RecordingChange, SessionHandle};
pub use manager::RadioSession;
pub use state::{SessionStats, SessionStatus};

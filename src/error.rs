//! Error kinds surfaced by the tuner, the capture pipeline and the session

use thiserror::Error;

/// Tuner driver failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TunerError {
    /// Bus or chip absent, or the driver is not in a usable state.
    /// Terminal for the driver instance once it comes from a bus failure.
    #[error("tuner hardware unavailable: {0}")]
    HardwareUnavailable(String),

    /// Rejected before any bus transaction
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Tune or seek did not complete within the bounded poll budget
    #[error("{operation} did not complete after {polls} polls")]
    OperationTimeout { operation: &'static str, polls: u32 },

    /// Seek settled but the signal quality gate failed, or the band edge was hit
    #[error("no station found (stopped at {frequency_mhz:.2} MHz, rssi {rssi})")]
    NoStationFound { frequency_mhz: f64, rssi: u8 },
}

/// Audio capture failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    /// Input stream or file I/O failure; ends the current recording only
    #[error("capture device failure: {0}")]
    CaptureDeviceFailure(String),
}

/// Errors returned through the session command surface
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RadioError {
    #[error(transparent)]
    Tuner(#[from] TunerError),

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("radio session is no longer running")]
    SessionClosed,
}

use thiserror::Error;

/// Device-level and configuration failures surfaced away from the
/// real-time path. Fatal invariant violations (out-of-range thread index,
/// `numFrames` exceeding the scratch buffer capacity) are programmer errors
/// and `panic!` instead of flowing through this type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error("audio driver is in a terminal invalid state")]
    DriverInvalid,
    #[error("device error: {0}")]
    Device(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

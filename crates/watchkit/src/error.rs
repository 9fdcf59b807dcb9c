use thiserror::Error;

/// Faults a probe run can end in. A module that is simply not due is not a
/// fault and never surfaces here; the schedule check returns a plain bool.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// The probe could not produce any usable output.
    #[error("no usable output: {0}")]
    Output(String),

    /// The probe produced a value the module cannot accept, usually because
    /// it is malformed or outside the configured limits.
    #[error("bad value: {0}")]
    Value(String),

    /// The probe exceeded the module timeout and was abandoned.
    #[error("timed out after {0:?}")]
    Timeout(std::time::Duration),
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// The workflow template is missing, malformed, or lacks a required
    /// node role. Fatal at startup: a worker with a bad template must not
    /// serve traffic.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The caller supplied an invalid parameter set.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

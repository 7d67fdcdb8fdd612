//! Error and result types shared by the library and the CLI.

pub type GrackleResult<T> = Result<T, GrackleError>;

#[derive(Debug, thiserror::Error)]
pub enum GrackleError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Bad CLI input, unconfigured backend, conflicting flags. Always fatal
    /// before any test run starts; maps to the dedicated config exit code.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    InvalidArgument(String),

    /// Malformed or corrupted trace file (unknown tag, bad argument,
    /// reference to an unregistered id).
    #[error("trace error: {0}")]
    Trace(String),

    /// Raised while driving a solver: backend failure or solver-reported
    /// internal inconsistency.
    #[error("solver error: {0}")]
    Solver(String),

    /// Registry invariant violation. Not recoverable by the session that
    /// raised it; isolated per-child in forked mode.
    #[error("invariant violation: {0}")]
    Invariant(String),
}

impl GrackleError {
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

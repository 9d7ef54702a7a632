//! Error types for the CAT engine.
//!
//! Nothing in here aborts an assessment session: item parameter problems
//! route the item to the unnormed pool, configuration problems are rejected
//! before a session starts, and protocol misuse is reported to the caller.

/// Why an item's IRT parameters cannot be used for scoring
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("difficulty is missing")]
    MissingDifficulty,
    #[error("{field} is not finite")]
    NonFinite { field: &'static str },
    #[error("discrimination must be positive, got {0}")]
    NonPositiveDiscrimination(f64),
    #[error("guessing must lie in [0, 1), got {0}")]
    GuessingOutOfRange(f64),
    #[error("upper asymptote must lie in (guessing, 1], got {0}")]
    UpperAsymptoteOutOfRange(f64),
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("validation error: {0}")]
    Validation(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error("no trial has been presented for this response")]
    NoPendingTrial,
    #[error("session already finished")]
    SessionFinished,
    #[error(transparent)]
    Config(#[from] ConfigError),
}

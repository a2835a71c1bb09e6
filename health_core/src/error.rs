//! Engine error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HealthError>;

#[derive(Error, Debug)]
pub enum HealthError {
    /// The probe returned without giving the builder a definite state.
    #[error("Health check '{check}' did not set a state")]
    StateNotSet { check: String },

    #[error("Health check '{check}' failed: {message}")]
    Evaluation { check: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid check pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl HealthError {
    pub fn evaluation(check: impl Into<String>, message: impl Into<String>) -> Self {
        HealthError::Evaluation {
            check: check.into(),
            message: message.into(),
        }
    }

    /// True for contract violations in check code rather than runtime faults.
    pub fn is_programming_fault(&self) -> bool {
        matches!(self, HealthError::StateNotSet { .. })
    }
}

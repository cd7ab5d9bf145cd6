//! Error types for the risk evaluation pipeline.

use thiserror::Error;

use crate::models::Tenor;

/// Errors raised while pricing positions or running a cycle.
#[derive(Error, Debug)]
pub enum RiskError {
    /// No rate for the position's tenor in the current snapshot set
    #[error("Missing rate for {tenor} (position {position_id})")]
    MissingRate { position_id: String, tenor: Tenor },

    /// Position data the calculator cannot price
    #[error("Invalid position {position_id}: {reason}")]
    InvalidPosition { position_id: String, reason: String },

    /// Upstream data source or sink failed; fatal to the cycle
    #[error("Provider unavailable: {provider} - {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Position {position_id} is already closed")]
    InvalidTransition { position_id: String },
}

impl RiskError {
    pub fn invalid_position(position_id: &str, reason: impl Into<String>) -> Self {
        RiskError::InvalidPosition {
            position_id: position_id.to_string(),
            reason: reason.into(),
        }
    }

    pub fn unavailable(provider: &str, reason: impl std::fmt::Display) -> Self {
        RiskError::ProviderUnavailable {
            provider: provider.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for RiskError
pub type Result<T> = std::result::Result<T, RiskError>;

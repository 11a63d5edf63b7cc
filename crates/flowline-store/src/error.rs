//! Error types for store operations.

use thiserror::Error;

/// Errors raised by message store implementations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Envelope not found or not in flight: {envelope_id}")]
    EnvelopeNotFound { envelope_id: String },

    #[error("Invalid envelope ID: {envelope_id}")]
    InvalidEnvelopeId { envelope_id: String },

    #[error("Store capacity exceeded: {depth} pending envelopes (max: {max_depth})")]
    CapacityExceeded { depth: usize, max_depth: usize },

    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Check if the operation may succeed when retried later
    pub fn is_transient(&self) -> bool {
        match self {
            Self::EnvelopeNotFound { .. } => false,
            Self::InvalidEnvelopeId { .. } => false,
            Self::CapacityExceeded { .. } => true,
            Self::Unavailable { .. } => true,
            Self::Serialization(_) => false,
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

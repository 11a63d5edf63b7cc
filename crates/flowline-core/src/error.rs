//! Error types for handler chain construction and execution.

use crate::message::Message;
use serde_json::Value;
use std::error::Error as StdError;
use std::fmt;
use thiserror::Error;

/// Result type returned by user handlers
pub type HandlerResult<T> = Result<T, HandlerError>;

// ============================================================================
// Configuration Errors
// ============================================================================

/// Construction-time failures of a handler chain
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Handler chain name cannot be empty")]
    EmptyChainName,

    #[error("Handler chain '{chain}' requires at least one processor")]
    NoProcessors { chain: String },

    #[error("Handler chain '{chain}' requires at least one destination")]
    NoDestinations { chain: String },

    #[error("Handler id cannot be empty in chain '{chain}'")]
    EmptyHandlerId { chain: String },

    #[error("Duplicate destination id '{id}' in chain '{chain}'")]
    DuplicateDestinationId { chain: String, id: String },

    #[error("Failed to start replay listener for chain '{chain}': {message}")]
    ListenerStart { chain: String, message: String },
}

// ============================================================================
// Handler Errors
// ============================================================================

/// Error returned from a user-supplied handler
///
/// Carries a human message, optional structured detail, and an optional
/// cause chain. Panics trapped by the engine surface as a `HandlerError`
/// with the message `"handler aborted"` and the panic payload as detail.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    detail: Option<Value>,
    #[source]
    cause: Option<Box<dyn StdError + Send + Sync>>,
}

impl HandlerError {
    /// Create new handler error with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            detail: None,
            cause: None,
        }
    }

    /// Attach structured detail
    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Attach an underlying cause
    pub fn with_cause(mut self, cause: impl StdError + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Error representing a trapped handler panic
    pub(crate) fn aborted(detail: Value) -> Self {
        Self::new("handler aborted").with_detail(detail)
    }

    /// Human message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Structured detail, if any
    pub fn detail(&self) -> Option<&Value> {
        self.detail.as_ref()
    }

    /// Render the cause chain, outermost first, one frame per line
    pub fn cause_chain(&self) -> Option<String> {
        let mut frames = Vec::new();
        let mut source: Option<&(dyn StdError + 'static)> =
            self.cause.as_deref().map(|c| c as &(dyn StdError + 'static));
        while let Some(err) = source {
            frames.push(err.to_string());
            source = err.source();
        }
        if frames.is_empty() {
            None
        } else {
            Some(frames.join("\ncaused by: "))
        }
    }

    /// Innermost cause message, if any
    pub fn root_cause(&self) -> Option<String> {
        let mut current: Option<&(dyn StdError + 'static)> =
            self.cause.as_deref().map(|c| c as &(dyn StdError + 'static));
        let mut last = None;
        while let Some(err) = current {
            last = Some(err.to_string());
            current = err.source();
        }
        last
    }
}

// ============================================================================
// Conversion Errors
// ============================================================================

/// Typed content/property access failures exposed to user handlers
#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("Failed to convert value to the specified type")]
    IncompatibleValue {
        #[source]
        source: serde_json::Error,
    },

    #[error("Property with key '{key}' not found")]
    PropertyNotFound { key: String },
}

// ============================================================================
// Execution Errors
// ============================================================================

/// Failure outcome of `execute` or `replay`
///
/// Wraps the `Message` snapshot persisted to the failure store together with
/// the human reason string returned to the caller.
#[derive(Debug, Error)]
pub struct ExecutionError {
    message: Message,
    reason: String,
}

impl ExecutionError {
    pub(crate) fn new(message: Message, reason: String) -> Self {
        Self { message, reason }
    }

    /// The message snapshot carrying the error fields
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Take ownership of the snapshot (used by the replay loop to carry the
    /// updated skip list forward between attempts)
    pub fn into_message(self) -> Message {
        self.message
    }

    /// Human reason string
    pub fn reason(&self) -> &str {
        &self.reason
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.reason)
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;

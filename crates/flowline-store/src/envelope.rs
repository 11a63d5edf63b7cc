//! Envelope types for stored payloads.

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Unique identifier for a stored envelope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EnvelopeId(String);

impl EnvelopeId {
    /// Generate new random envelope ID
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get envelope ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EnvelopeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EnvelopeId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(StoreError::InvalidEnvelopeId {
                envelope_id: s.to_string(),
            });
        }
        Ok(Self(s.to_string()))
    }
}

/// A payload held by a store, together with delivery metadata
///
/// The payload is opaque to the store; handler chains always write their
/// serialized `Message` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Stable identifier assigned by the store on append
    pub id: EnvelopeId,

    /// Opaque serialized payload
    pub payload: Value,

    /// When the payload was appended
    pub enqueued_at: DateTime<Utc>,

    /// Number of times the envelope has been handed out by `retrieve`
    pub delivery_count: u32,
}

impl Envelope {
    /// Create new envelope wrapping a payload
    pub fn new(payload: Value) -> Self {
        Self {
            id: EnvelopeId::new(),
            payload,
            enqueued_at: Utc::now(),
            delivery_count: 0,
        }
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;

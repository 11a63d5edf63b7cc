//! The serializable message record that survives failure and replay.

use crate::error::HandlerError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;

/// Per-message metadata carried across replays
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageMetadata {
    /// Destination ids known to have already succeeded for this message
    #[serde(default)]
    pub destinations_to_skip: Vec<String>,
}

/// Error snapshot recorded for a single destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    /// Human error message
    pub message: String,

    /// Rendered cause chain, outermost first
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,

    /// Structured detail supplied by the handler
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,

    /// Innermost cause message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl ErrorInfo {
    /// Flatten a handler error into its persisted form
    pub fn from_handler_error(error: &HandlerError) -> Self {
        Self {
            message: error.message().to_string(),
            stack_trace: error.cause_chain(),
            detail: error.detail().cloned(),
            cause: error.root_cause(),
        }
    }
}

/// The serializable unit that flows through a handler chain
///
/// This is the only on-wire artifact: the record written to the failure,
/// replay, and dead-letter stores. Field names are part of the wire contract;
/// optional fields are absent when unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Opaque unique identifier, stable across replays
    pub id: String,

    /// Name of the chain that created the message
    pub handler_chain_name: String,

    /// Current payload; a transformer may replace it mid-pipeline
    pub content: Value,

    /// Shared scratch space between handlers
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,

    #[serde(default)]
    pub metadata: MessageMetadata,

    /// Most recent failure snapshot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_msg: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_stack_trace: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_details: Option<Value>,

    /// Per-destination errors from the most recent attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_errors: Option<BTreeMap<String, ErrorInfo>>,

    /// Per-destination results from the most recent attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_results: Option<BTreeMap<String, Value>>,
}

impl Message {
    /// Create a fresh message at ingress with a new unique id
    pub fn new(handler_chain_name: impl Into<String>, content: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            handler_chain_name: handler_chain_name.into(),
            content,
            properties: BTreeMap::new(),
            metadata: MessageMetadata::default(),
            error_msg: None,
            error_stack_trace: None,
            error_details: None,
            destination_errors: None,
            destination_results: None,
        }
    }

    /// Reset the message for another replay attempt
    ///
    /// Clears the error snapshot and per-destination results while preserving
    /// `id`, `handlerChainName`, `content`, `properties`, and the skip list.
    pub fn clean_for_replay(&mut self) {
        self.error_msg = None;
        self.error_stack_trace = None;
        self.error_details = None;
        self.destination_errors = None;
        self.destination_results = None;
    }

    /// Check whether a destination already succeeded for this message
    pub fn is_destination_done(&self, destination_id: &str) -> bool {
        self.metadata
            .destinations_to_skip
            .iter()
            .any(|id| id == destination_id)
    }

    /// Record a destination success in the skip list (idempotent)
    pub fn mark_destination_done(&mut self, destination_id: &str) {
        if !self.is_destination_done(destination_id) {
            self.metadata
                .destinations_to_skip
                .push(destination_id.to_string());
        }
    }
}

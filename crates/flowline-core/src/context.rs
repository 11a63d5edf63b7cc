//! Mutable per-traversal wrapper around a message.

use crate::error::ConversionError;
use crate::message::Message;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;

/// In-memory mutable cell wrapping a [`Message`] for one pipeline traversal
///
/// A context is single-owner at any moment: the processor stage holds the
/// live context, each destination task gets its own deep clone, and the
/// orchestrator keeps a private snapshot for failure persistence. Cloning a
/// context deep-copies the message, so no two owners can observe each
/// other's mutations.
#[derive(Debug, Clone)]
pub struct MessageContext {
    message: Message,
}

impl MessageContext {
    /// Create a context for a fresh ingress message
    pub fn new(handler_chain_name: impl Into<String>, content: Value) -> Self {
        Self {
            message: Message::new(handler_chain_name, content),
        }
    }

    /// Wrap an existing message verbatim (replay path)
    pub fn from_message(message: Message) -> Self {
        Self { message }
    }

    /// Message id, fixed at construction
    pub fn id(&self) -> &str {
        &self.message.id
    }

    /// Owning chain name, fixed at construction
    pub fn handler_chain_name(&self) -> &str {
        &self.message.handler_chain_name
    }

    /// Current content as a dynamic value
    pub fn content(&self) -> Value {
        self.message.content.clone()
    }

    /// Decode the current content into a concrete type
    pub fn content_as<T: DeserializeOwned>(&self) -> Result<T, ConversionError> {
        serde_json::from_value(self.message.content.clone())
            .map_err(|source| ConversionError::IncompatibleValue { source })
    }

    pub(crate) fn set_content(&mut self, content: Value) {
        self.message.content = content;
    }

    /// Store a property, replacing any previous value under the key
    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.message.properties.insert(key.into(), value);
    }

    /// Property value under the key, if present
    pub fn property(&self, key: &str) -> Option<Value> {
        self.message.properties.get(key).cloned()
    }

    /// Decode the property under the key into a concrete type
    pub fn property_as<T: DeserializeOwned>(&self, key: &str) -> Result<T, ConversionError> {
        let value = self
            .message
            .properties
            .get(key)
            .ok_or_else(|| ConversionError::PropertyNotFound {
                key: key.to_string(),
            })?;
        serde_json::from_value(value.clone())
            .map_err(|source| ConversionError::IncompatibleValue { source })
    }

    /// Check whether a property exists
    pub fn has_property(&self, key: &str) -> bool {
        self.message.properties.contains_key(key)
    }

    /// Remove a property, returning its previous value
    pub fn remove_property(&mut self, key: &str) -> Option<Value> {
        self.message.properties.remove(key)
    }

    /// Snapshot of all properties
    pub fn properties(&self) -> BTreeMap<String, Value> {
        self.message.properties.clone()
    }

    /// Destination ids that already succeeded for this message
    pub fn destinations_to_skip(&self) -> &[String] {
        &self.message.metadata.destinations_to_skip
    }

    pub(crate) fn should_skip(&self, destination_id: &str) -> bool {
        self.message.is_destination_done(destination_id)
    }

    pub(crate) fn mark_destination_done(&mut self, destination_id: &str) {
        self.message.mark_destination_done(destination_id);
    }

    pub(crate) fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    /// Copy of the underlying message record
    pub fn to_message(&self) -> Message {
        self.message.clone()
    }

    /// Unwrap into the underlying message record
    pub fn into_message(self) -> Message {
        self.message
    }
}

//! Replay listener: re-drives persisted failures and dead-letters the
//! exhausted ones.

use crate::chain::ChainInner;
use crate::error::ConfigError;
use crate::message::Message;
use flowline_store::{Envelope, EnvelopeId, MessageStore};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "replay_tests.rs"]
mod tests;

// ============================================================================
// Configuration
// ============================================================================

/// Configuration for a chain's replay listener
#[derive(Clone)]
pub struct ReplayConfig {
    /// Delay between polls of the replay source when it is drained
    pub polling_interval: Duration,

    /// Additional replay attempts per envelope after the initial one
    pub max_retries: u32,

    /// Fixed delay between replay attempts
    pub retry_interval: Duration,

    /// Store receiving messages whose retry budget is exhausted
    pub dead_letter_store: Arc<dyn MessageStore>,

    /// Source of envelopes to replay; the chain's failure store when absent
    pub replay_store: Option<Arc<dyn MessageStore>>,
}

impl ReplayConfig {
    /// Create a new replay configuration reading from the chain's own
    /// failure store
    pub fn new(
        polling_interval: Duration,
        max_retries: u32,
        retry_interval: Duration,
        dead_letter_store: Arc<dyn MessageStore>,
    ) -> Self {
        Self {
            polling_interval,
            max_retries,
            retry_interval,
            dead_letter_store,
            replay_store: None,
        }
    }

    /// Read envelopes from a dedicated replay store instead of the chain's
    /// failure store
    pub fn with_replay_store(mut self, replay_store: Arc<dyn MessageStore>) -> Self {
        self.replay_store = Some(replay_store);
        self
    }
}

impl fmt::Debug for ReplayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplayConfig")
            .field("polling_interval", &self.polling_interval)
            .field("max_retries", &self.max_retries)
            .field("retry_interval", &self.retry_interval)
            .field("has_replay_store", &self.replay_store.is_some())
            .finish()
    }
}

// ============================================================================
// Listener Task
// ============================================================================

/// Handle binding the listener task to the chain's lifetime
pub(crate) struct ReplayListenerHandle {
    handle: JoinHandle<()>,
}

impl Drop for ReplayListenerHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Long-lived polling loop over the replay source
///
/// Single-flight per envelope: an envelope is fully settled (acknowledged or
/// released) before the next poll, so acknowledgements are never reordered
/// relative to their polls.
pub(crate) struct ReplayListener {
    chain: Arc<ChainInner>,
    config: ReplayConfig,
    source: Arc<dyn MessageStore>,
}

impl ReplayListener {
    /// Spawn the listener task on the current runtime
    pub(crate) fn start(
        chain: Arc<ChainInner>,
        config: ReplayConfig,
    ) -> Result<ReplayListenerHandle, ConfigError> {
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(ConfigError::ListenerStart {
                chain: chain.name().to_string(),
                message: "no async runtime available".to_string(),
            });
        }

        let source = config
            .replay_store
            .clone()
            .unwrap_or_else(|| chain.failure_store());
        let listener = Self {
            chain,
            config,
            source,
        };

        info!(chain = %listener.chain.name(), "Replay listener started");
        let handle = tokio::spawn(listener.run());
        Ok(ReplayListenerHandle { handle })
    }

    async fn run(self) {
        loop {
            match self.source.retrieve().await {
                Ok(Some(envelope)) => {
                    self.handle_envelope(envelope).await;
                }
                Ok(None) => {
                    tokio::time::sleep(self.config.polling_interval).await;
                }
                Err(err) => {
                    warn!(
                        chain = %self.chain.name(),
                        error = %err,
                        "Replay source poll failed"
                    );
                    tokio::time::sleep(self.config.polling_interval).await;
                }
            }
        }
    }

    /// Replay one envelope to settlement: success, dead-letter, or release
    async fn handle_envelope(&self, envelope: Envelope) {
        let mut current: Message = match serde_json::from_value(envelope.payload.clone()) {
            Ok(message) => message,
            Err(err) => {
                // The payload will never parse on any redelivery; park it in
                // the dead-letter store and drop the source envelope.
                error!(
                    chain = %self.chain.name(),
                    envelope_id = %envelope.id,
                    error = %err,
                    "Envelope payload is not a valid message, dead-lettering"
                );
                match self.config.dead_letter_store.store(envelope.payload).await {
                    Ok(_) => self.acknowledge(&envelope.id, true).await,
                    Err(store_err) => {
                        error!(
                            chain = %self.chain.name(),
                            envelope_id = %envelope.id,
                            error = %store_err,
                            "Failed to dead-letter unparseable envelope"
                        );
                        self.acknowledge(&envelope.id, false).await;
                    }
                }
                return;
            }
        };

        let total_attempts = 1 + self.config.max_retries;
        for attempt in 1..=total_attempts {
            debug!(
                chain = %self.chain.name(),
                envelope_id = %envelope.id,
                message_id = %current.id,
                attempt,
                total_attempts,
                "Replaying message"
            );

            match self.chain.replay_message(current).await {
                Ok(success) => {
                    info!(
                        chain = %self.chain.name(),
                        envelope_id = %envelope.id,
                        message_id = %success.message.id,
                        attempt,
                        "Replay succeeded"
                    );
                    self.acknowledge(&envelope.id, true).await;
                    return;
                }
                Err(failure) => {
                    warn!(
                        chain = %self.chain.name(),
                        envelope_id = %envelope.id,
                        attempt,
                        total_attempts,
                        error = %failure,
                        "Replay attempt failed"
                    );
                    // Carry the updated skip list into the next attempt.
                    current = failure.into_message();
                    if attempt < total_attempts {
                        tokio::time::sleep(self.config.retry_interval).await;
                    }
                }
            }
        }

        self.dead_letter(&envelope.id, current).await;
    }

    /// Park an exhausted message and settle its source envelope
    async fn dead_letter(&self, envelope_id: &EnvelopeId, message: Message) {
        let message_id = message.id.clone();
        let payload = match serde_json::to_value(&message) {
            Ok(payload) => payload,
            Err(err) => {
                error!(
                    chain = %self.chain.name(),
                    envelope_id = %envelope_id,
                    message_id = %message_id,
                    error = %err,
                    "Failed to serialize message for the dead-letter store"
                );
                self.acknowledge(envelope_id, false).await;
                return;
            }
        };

        match self.config.dead_letter_store.store(payload).await {
            Ok(dead_letter_id) => {
                error!(
                    chain = %self.chain.name(),
                    envelope_id = %envelope_id,
                    message_id = %message_id,
                    dead_letter_id = %dead_letter_id,
                    "Replay retries exhausted, message dead-lettered"
                );
                self.acknowledge(envelope_id, true).await;
            }
            Err(err) => {
                // Leave the envelope to the source store's redelivery.
                error!(
                    chain = %self.chain.name(),
                    envelope_id = %envelope_id,
                    message_id = %message_id,
                    error = %err,
                    "Failed to dead-letter message"
                );
                self.acknowledge(envelope_id, false).await;
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &EnvelopeId, success: bool) {
        if let Err(err) = self.source.acknowledge(envelope_id, success).await {
            error!(
                chain = %self.chain.name(),
                envelope_id = %envelope_id,
                success,
                error = %err,
                "Failed to settle replay envelope"
            );
        }
    }
}

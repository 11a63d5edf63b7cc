//! In-memory store implementation for testing and development.
//!
//! Provides a fully functional implementation of [`MessageStore`] that:
//! - Delivers envelopes in FIFO order
//! - Tracks in-flight envelopes between `retrieve` and `acknowledge`
//! - Redelivers negatively acknowledged envelopes at the front of the queue
//! - Enforces a configurable depth limit

use crate::envelope::{Envelope, EnvelopeId};
use crate::error::StoreError;
use crate::store::MessageStore;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use tracing::debug;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Configuration for the in-memory store
#[derive(Debug, Clone)]
pub struct InMemoryStoreConfig {
    /// Maximum number of pending envelopes before `store` rejects appends
    pub max_depth: usize,
}

impl Default for InMemoryStoreConfig {
    fn default() -> Self {
        Self { max_depth: 10_000 }
    }
}

/// Internal queue state
struct StoreState {
    /// Pending envelopes in FIFO order
    pending: VecDeque<Envelope>,
    /// Envelopes handed out by `retrieve` and not yet settled
    in_flight: HashMap<EnvelopeId, Envelope>,
}

impl StoreState {
    fn new() -> Self {
        Self {
            pending: VecDeque::new(),
            in_flight: HashMap::new(),
        }
    }
}

/// Thread-safe in-memory message store
#[derive(Clone)]
pub struct InMemoryStore {
    state: Arc<RwLock<StoreState>>,
    config: InMemoryStoreConfig,
}

impl InMemoryStore {
    /// Create new store with configuration
    pub fn new(config: InMemoryStoreConfig) -> Self {
        Self {
            state: Arc::new(RwLock::new(StoreState::new())),
            config,
        }
    }

    /// Number of pending (not in-flight) envelopes
    pub fn pending_len(&self) -> usize {
        self.state.read().unwrap().pending.len()
    }

    /// Number of envelopes currently in flight
    pub fn in_flight_len(&self) -> usize {
        self.state.read().unwrap().in_flight.len()
    }

    /// Check whether the store holds no envelopes at all
    pub fn is_empty(&self) -> bool {
        let state = self.state.read().unwrap();
        state.pending.is_empty() && state.in_flight.is_empty()
    }

    /// Snapshot of all pending payloads, front first
    pub fn peek_all(&self) -> Vec<Value> {
        self.state
            .read()
            .unwrap()
            .pending
            .iter()
            .map(|e| e.payload.clone())
            .collect()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new(InMemoryStoreConfig::default())
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn store(&self, payload: Value) -> Result<EnvelopeId, StoreError> {
        let mut state = self.state.write().unwrap();

        if state.pending.len() >= self.config.max_depth {
            return Err(StoreError::CapacityExceeded {
                depth: state.pending.len(),
                max_depth: self.config.max_depth,
            });
        }

        let envelope = Envelope::new(payload);
        let id = envelope.id.clone();
        state.pending.push_back(envelope);

        debug!(envelope_id = %id, depth = state.pending.len(), "Envelope appended");
        Ok(id)
    }

    async fn retrieve(&self) -> Result<Option<Envelope>, StoreError> {
        let mut state = self.state.write().unwrap();

        let mut envelope = match state.pending.pop_front() {
            Some(envelope) => envelope,
            None => return Ok(None),
        };

        envelope.delivery_count += 1;
        state
            .in_flight
            .insert(envelope.id.clone(), envelope.clone());

        debug!(
            envelope_id = %envelope.id,
            delivery_count = envelope.delivery_count,
            "Envelope handed out"
        );
        Ok(Some(envelope))
    }

    async fn acknowledge(&self, id: &EnvelopeId, success: bool) -> Result<(), StoreError> {
        let mut state = self.state.write().unwrap();

        let envelope = state
            .in_flight
            .remove(id)
            .ok_or_else(|| StoreError::EnvelopeNotFound {
                envelope_id: id.to_string(),
            })?;

        if success {
            debug!(envelope_id = %id, "Envelope settled");
        } else {
            // Redeliver before anything appended later.
            debug!(envelope_id = %id, "Envelope released for redelivery");
            state.pending.push_front(envelope);
        }

        Ok(())
    }
}

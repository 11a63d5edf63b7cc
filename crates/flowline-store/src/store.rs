//! Store capability trait consumed by handler chains.

use crate::envelope::{Envelope, EnvelopeId};
use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::Value;

/// Durable append/retrieve/acknowledge store for serialized messages
///
/// Implementations must be internally thread-safe: a handler chain shares one
/// store between its execute path and its replay listener, and multiple
/// chains may share a single store instance.
///
/// Delivery contract:
/// - `retrieve` hands out the next available envelope and marks it in-flight;
///   an in-flight envelope is not handed out again until released.
/// - `acknowledge(id, true)` removes the envelope permanently.
/// - `acknowledge(id, false)` releases the in-flight mark so the envelope is
///   redelivered by a later `retrieve`.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append a payload, returning the identifier assigned to its envelope
    async fn store(&self, payload: Value) -> Result<EnvelopeId, StoreError>;

    /// Next available envelope, marked in-flight; `None` when the store is
    /// drained
    async fn retrieve(&self) -> Result<Option<Envelope>, StoreError>;

    /// Settle an in-flight envelope
    async fn acknowledge(&self, id: &EnvelopeId, success: bool) -> Result<(), StoreError>;
}

//! Handler chain orchestration: processor stage, destination fan-out, and
//! failure persistence.

use crate::context::MessageContext;
use crate::error::{ConfigError, ExecutionError, HandlerError};
use crate::handler::{panic_detail, run_trapped, Destination, Processor, ProcessorKind};
use crate::message::{ErrorInfo, Message};
use crate::replay::{ReplayConfig, ReplayListener, ReplayListenerHandle};
use crate::retry::RetryingDestination;
use flowline_store::MessageStore;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "chain_tests.rs"]
mod tests;

// ============================================================================
// Execution Outcome
// ============================================================================

/// Successful outcome of `execute` or `replay`
#[derive(Debug, Clone)]
pub struct ExecutionSuccess {
    /// Final message record, skip list included
    pub message: Message,

    /// Value returned by each destination that ran in this attempt
    ///
    /// Keys are exactly the configured destinations minus those skipped at
    /// entry; empty when a filter dropped the message.
    pub destination_results: BTreeMap<String, Value>,
}

/// Outcome of the sequential processor stage
enum ProcessorStageOutcome {
    /// All processors ran; continue to the destination stage
    Completed,
    /// A filter returned false; terminate successfully without destinations
    Dropped,
    /// A processor failed; the snapshot carries the error fields
    Failed(String),
}

// ============================================================================
// Prepared Chain State
// ============================================================================

/// A destination with its retry decoration already applied
pub(crate) struct PreparedDestination {
    id: String,
    handler: Arc<dyn crate::handler::DestinationHandler>,
}

/// Immutable chain state shared between the public handle and the replay
/// listener task
pub(crate) struct ChainInner {
    name: String,
    processors: Vec<Processor>,
    destinations: Vec<PreparedDestination>,
    failure_store: Arc<dyn MessageStore>,
}

impl ChainInner {
    pub(crate) fn failure_store(&self) -> Arc<dyn MessageStore> {
        Arc::clone(&self.failure_store)
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Re-drive a persisted message through the pipeline without touching the
    /// failure store; the caller owns the persistence decision.
    pub(crate) async fn replay_message(
        &self,
        mut message: Message,
    ) -> Result<ExecutionSuccess, ExecutionError> {
        message.clean_for_replay();
        let ctx = MessageContext::from_message(message);
        self.run(ctx, false).await
    }

    /// Drive a context through both stages
    ///
    /// `persist_on_failure` selects the execute path (snapshot written to the
    /// failure store) versus the replay path (no store write).
    pub(crate) async fn run(
        &self,
        mut live: MessageContext,
        persist_on_failure: bool,
    ) -> Result<ExecutionSuccess, ExecutionError> {
        // The snapshot is the authoritative failure payload; handlers only
        // ever see the live context.
        let mut snapshot = live.clone();

        match self.run_processors(&mut live, &mut snapshot).await {
            ProcessorStageOutcome::Completed => {}
            ProcessorStageOutcome::Dropped => {
                info!(
                    chain = %self.name,
                    message_id = %live.id(),
                    "Message dropped by filter"
                );
                return Ok(ExecutionSuccess {
                    message: live.into_message(),
                    destination_results: BTreeMap::new(),
                });
            }
            ProcessorStageOutcome::Failed(reason) => {
                if persist_on_failure {
                    self.persist_failure(&snapshot).await;
                }
                return Err(ExecutionError::new(snapshot.into_message(), reason));
            }
        }

        match self.run_destinations(&live, &mut snapshot).await {
            Ok(results) => {
                info!(
                    chain = %self.name,
                    message_id = %live.id(),
                    destination_count = results.len(),
                    "Message delivered to all destinations"
                );
                Ok(ExecutionSuccess {
                    message: snapshot.into_message(),
                    destination_results: results,
                })
            }
            Err(reason) => {
                if persist_on_failure {
                    self.persist_failure(&snapshot).await;
                }
                Err(ExecutionError::new(snapshot.into_message(), reason))
            }
        }
    }

    /// Run processors sequentially on the caller's task, fail-fast
    async fn run_processors(
        &self,
        live: &mut MessageContext,
        snapshot: &mut MessageContext,
    ) -> ProcessorStageOutcome {
        for processor in &self.processors {
            let result = match processor.kind() {
                ProcessorKind::Filter(handler) => {
                    match run_trapped(handler.filter(live)).await {
                        Ok(true) => Ok(()),
                        Ok(false) => {
                            debug!(
                                chain = %self.name,
                                processor = %processor.id(),
                                message_id = %live.id(),
                                "Filter rejected message"
                            );
                            return ProcessorStageOutcome::Dropped;
                        }
                        Err(err) => Err(err),
                    }
                }
                ProcessorKind::Transformer(handler) => {
                    match run_trapped(handler.transform(live)).await {
                        Ok(content) => {
                            live.set_content(content);
                            Ok(())
                        }
                        Err(err) => Err(err),
                    }
                }
                ProcessorKind::Generic(handler) => run_trapped(handler.process(live)).await,
            };

            if let Err(err) = result {
                let reason = format!(
                    "Failed to execute processor: {} - {}",
                    processor.id(),
                    err.message()
                );
                error!(
                    chain = %self.name,
                    processor = %processor.id(),
                    message_id = %live.id(),
                    error = %err,
                    "Processor failed"
                );

                let record = snapshot.message_mut();
                record.error_msg = Some(reason.clone());
                record.error_stack_trace = err.cause_chain();
                record.error_details = err.detail().cloned();
                return ProcessorStageOutcome::Failed(reason);
            }
        }

        ProcessorStageOutcome::Completed
    }

    /// Fan the message out to every effective destination concurrently
    ///
    /// All spawned tasks run to completion before the stage returns; each
    /// task owns a deep clone of the live context. On failure the snapshot is
    /// enriched with the skip list, per-destination results, and errors.
    async fn run_destinations(
        &self,
        live: &MessageContext,
        snapshot: &mut MessageContext,
    ) -> Result<BTreeMap<String, Value>, String> {
        let effective: Vec<&PreparedDestination> = self
            .destinations
            .iter()
            .filter(|dest| !live.should_skip(&dest.id))
            .collect();

        if effective.is_empty() {
            debug!(
                chain = %self.name,
                message_id = %live.id(),
                "All destinations already delivered, nothing to do"
            );
            return Ok(BTreeMap::new());
        }

        let mut handles = Vec::with_capacity(effective.len());
        for dest in effective {
            let handler = Arc::clone(&dest.handler);
            let mut task_ctx = live.clone();
            let id = dest.id.clone();
            handles.push((
                id,
                tokio::spawn(async move { handler.deliver(&mut task_ctx).await }),
            ));
        }

        let mut successes: BTreeMap<String, Value> = BTreeMap::new();
        // Declaration order, for stable aggregated error text.
        let mut failures: Vec<(String, HandlerError)> = Vec::new();

        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(value)) => {
                    successes.insert(id, value);
                }
                Ok(Err(err)) => failures.push((id, err)),
                Err(join_err) => {
                    let err = if join_err.is_panic() {
                        HandlerError::aborted(panic_detail(join_err.into_panic()))
                    } else {
                        HandlerError::new("destination task cancelled")
                    };
                    failures.push((id, err));
                }
            }
        }

        for id in successes.keys() {
            snapshot.mark_destination_done(id);
        }

        if failures.is_empty() {
            snapshot.message_mut().destination_results = Some(successes.clone());
            return Ok(successes);
        }

        for (id, err) in &failures {
            error!(
                chain = %self.name,
                destination = %id,
                message_id = %live.id(),
                error = %err,
                "Destination failed"
            );
        }

        let reason = if failures.len() == 1 {
            let (id, err) = &failures[0];
            format!("Failed to execute destination: {} - {}", id, err.message())
        } else {
            let ids: Vec<&str> = failures.iter().map(|(id, _)| id.as_str()).collect();
            format!("Failed to execute destinations: {}", ids.join(", "))
        };

        let record = snapshot.message_mut();
        record.error_msg = Some(reason.clone());
        if let [(_, err)] = failures.as_slice() {
            record.error_stack_trace = err.cause_chain();
            record.error_details = err.detail().cloned();
        }
        record.destination_errors = Some(
            failures
                .iter()
                .map(|(id, err)| (id.clone(), ErrorInfo::from_handler_error(err)))
                .collect(),
        );
        if !successes.is_empty() {
            record.destination_results = Some(successes);
        }

        Err(reason)
    }

    /// Write the failure snapshot to the failure store
    ///
    /// Store errors are logged and swallowed; they never mask the execution
    /// failure returned to the caller.
    async fn persist_failure(&self, snapshot: &MessageContext) {
        let record = snapshot.to_message();
        let payload = match serde_json::to_value(&record) {
            Ok(payload) => payload,
            Err(err) => {
                error!(
                    chain = %self.name,
                    message_id = %record.id,
                    error = %err,
                    "Failed to serialize message for the failure store"
                );
                return;
            }
        };

        match self.failure_store.store(payload).await {
            Ok(envelope_id) => {
                warn!(
                    chain = %self.name,
                    message_id = %record.id,
                    envelope_id = %envelope_id,
                    "Failed message persisted to the failure store"
                );
            }
            Err(err) => {
                error!(
                    chain = %self.name,
                    message_id = %record.id,
                    error = %err,
                    "Failed to persist message to the failure store"
                );
            }
        }
    }
}

// ============================================================================
// HandlerChain
// ============================================================================

/// A named, immutable pipeline of processors and destinations
///
/// Construction validates the registration, applies retry decoration to
/// destinations, and, when a replay configuration is supplied, starts the
/// replay listener. The listener is bound to the chain's lifetime: dropping
/// the chain aborts it.
pub struct HandlerChain {
    inner: Arc<ChainInner>,
    _listener: Option<ReplayListenerHandle>,
}

impl HandlerChain {
    /// Create a new handler chain
    ///
    /// Fails with [`ConfigError`] when the name, processor list, destination
    /// list, or any handler id is empty, when destination ids collide, or
    /// when the replay listener cannot be started.
    pub fn new(
        name: impl Into<String>,
        processors: Vec<Processor>,
        destinations: Vec<Destination>,
        failure_store: Arc<dyn MessageStore>,
        replay_config: Option<ReplayConfig>,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ConfigError::EmptyChainName);
        }
        if processors.is_empty() {
            return Err(ConfigError::NoProcessors { chain: name });
        }
        if destinations.is_empty() {
            return Err(ConfigError::NoDestinations { chain: name });
        }
        if processors.iter().any(|p| p.id().is_empty())
            || destinations.iter().any(|d| d.id().is_empty())
        {
            return Err(ConfigError::EmptyHandlerId { chain: name });
        }

        let mut prepared: Vec<PreparedDestination> = Vec::with_capacity(destinations.len());
        for dest in &destinations {
            if prepared.iter().any(|p| p.id == dest.id()) {
                return Err(ConfigError::DuplicateDestinationId {
                    chain: name,
                    id: dest.id().to_string(),
                });
            }
            let handler = match dest.retry_config() {
                Some(config) => Arc::new(RetryingDestination::new(
                    dest.id().to_string(),
                    dest.handler(),
                    config.clone(),
                )) as Arc<dyn crate::handler::DestinationHandler>,
                None => dest.handler(),
            };
            prepared.push(PreparedDestination {
                id: dest.id().to_string(),
                handler,
            });
        }

        let inner = Arc::new(ChainInner {
            name,
            processors,
            destinations: prepared,
            failure_store,
        });

        let listener = match replay_config {
            Some(config) => Some(ReplayListener::start(Arc::clone(&inner), config)?),
            None => None,
        };

        info!(
            chain = %inner.name,
            processors = inner.processors.len(),
            destinations = inner.destinations.len(),
            replay_listener = listener.is_some(),
            "Handler chain created"
        );

        Ok(Self {
            inner,
            _listener: listener,
        })
    }

    /// Chain name
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// The failure store this chain persists to
    pub fn failure_store(&self) -> Arc<dyn MessageStore> {
        self.inner.failure_store()
    }

    /// Run a fresh payload through the pipeline
    ///
    /// On failure the message snapshot is written to the failure store and
    /// returned inside the error.
    pub async fn execute(&self, content: Value) -> Result<ExecutionSuccess, ExecutionError> {
        let ctx = MessageContext::new(self.inner.name(), content);
        debug!(
            chain = %self.inner.name,
            message_id = %ctx.id(),
            "Executing handler chain"
        );
        self.inner.run(ctx, true).await
    }

    /// Re-drive a persisted message through the pipeline
    ///
    /// The message is taken verbatim (id, properties, and skip list
    /// preserved) and cleaned of its previous error snapshot. Failures are
    /// NOT written to the failure store; the replay listener owns that
    /// decision.
    pub async fn replay(&self, message: Message) -> Result<ExecutionSuccess, ExecutionError> {
        debug!(
            chain = %self.inner.name,
            message_id = %message.id,
            skipped = message.metadata.destinations_to_skip.len(),
            "Replaying message"
        );
        self.inner.replay_message(message).await
    }
}

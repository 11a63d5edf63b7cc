//! Handler traits and registry descriptors for processors and destinations.

use crate::context::MessageContext;
use crate::error::{HandlerError, HandlerResult};
use crate::retry::RetryConfig;
use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Value};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;

// ============================================================================
// Handler Traits
// ============================================================================

/// Boolean gate: `true` continues the pipeline, `false` drops the message
#[async_trait]
pub trait FilterHandler: Send + Sync {
    async fn filter(&self, ctx: &mut MessageContext) -> HandlerResult<bool>;
}

/// Content replacement: the returned value becomes the context's content
#[async_trait]
pub trait TransformerHandler: Send + Sync {
    async fn transform(&self, ctx: &mut MessageContext) -> HandlerResult<Value>;
}

/// Side-effecting processor; influences only properties or external state
#[async_trait]
pub trait GenericHandler: Send + Sync {
    async fn process(&self, ctx: &mut MessageContext) -> HandlerResult<()>;
}

/// Terminal delivery unit; the returned value is recorded under the
/// destination's id in the execution results
#[async_trait]
pub trait DestinationHandler: Send + Sync {
    async fn deliver(&self, ctx: &mut MessageContext) -> HandlerResult<Value>;
}

// ============================================================================
// Registry Descriptors
// ============================================================================

/// The three processor flavors
#[derive(Clone)]
pub enum ProcessorKind {
    Filter(Arc<dyn FilterHandler>),
    Transformer(Arc<dyn TransformerHandler>),
    Generic(Arc<dyn GenericHandler>),
}

impl ProcessorKind {
    fn kind_name(&self) -> &'static str {
        match self {
            Self::Filter(_) => "filter",
            Self::Transformer(_) => "transformer",
            Self::Generic(_) => "generic",
        }
    }
}

/// A registered processor: stable id plus the handler
///
/// Identifiers are supplied explicitly at registration; they key error
/// reporting and must be stable across process restarts for replay to stay
/// meaningful.
#[derive(Clone)]
pub struct Processor {
    id: String,
    kind: ProcessorKind,
}

impl Processor {
    /// Register a filter processor
    pub fn filter(id: impl Into<String>, handler: impl FilterHandler + 'static) -> Self {
        Self {
            id: id.into(),
            kind: ProcessorKind::Filter(Arc::new(handler)),
        }
    }

    /// Register a transformer processor
    pub fn transformer(id: impl Into<String>, handler: impl TransformerHandler + 'static) -> Self {
        Self {
            id: id.into(),
            kind: ProcessorKind::Transformer(Arc::new(handler)),
        }
    }

    /// Register a generic processor
    pub fn generic(id: impl Into<String>, handler: impl GenericHandler + 'static) -> Self {
        Self {
            id: id.into(),
            kind: ProcessorKind::Generic(Arc::new(handler)),
        }
    }

    /// Stable processor id
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn kind(&self) -> &ProcessorKind {
        &self.kind
    }
}

impl fmt::Debug for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Processor")
            .field("id", &self.id)
            .field("kind", &self.kind.kind_name())
            .finish()
    }
}

/// A registered destination: stable id, handler, and optional retry policy
#[derive(Clone)]
pub struct Destination {
    id: String,
    handler: Arc<dyn DestinationHandler>,
    retry: Option<RetryConfig>,
}

impl Destination {
    /// Register a destination
    pub fn new(id: impl Into<String>, handler: impl DestinationHandler + 'static) -> Self {
        Self {
            id: id.into(),
            handler: Arc::new(handler),
            retry: None,
        }
    }

    /// Attach a bounded retry policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Stable destination id
    pub fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn handler(&self) -> Arc<dyn DestinationHandler> {
        Arc::clone(&self.handler)
    }

    pub(crate) fn retry_config(&self) -> Option<&RetryConfig> {
        self.retry.as_ref()
    }
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Destination")
            .field("id", &self.id)
            .field("retry", &self.retry)
            .finish()
    }
}

// ============================================================================
// Panic Trapping
// ============================================================================

/// Run a handler future, converting a panic into an ordinary handler error
///
/// The returned error carries the fixed message `"handler aborted"` with the
/// panic payload as detail, so an abort inside a handler never unwinds past
/// the pipeline.
pub(crate) async fn run_trapped<F, T>(future: F) -> HandlerResult<T>
where
    F: Future<Output = HandlerResult<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::aborted(panic_detail(payload))),
    }
}

/// Extract a serializable detail from a panic payload
pub(crate) fn panic_detail(payload: Box<dyn Any + Send>) -> Value {
    if let Some(text) = payload.downcast_ref::<&str>() {
        json!(text)
    } else if let Some(text) = payload.downcast_ref::<String>() {
        json!(text)
    } else {
        json!("non-string panic payload")
    }
}

//! # Flowline Core
//!
//! Handler chain execution engine and replay coordinator for message
//! processing pipelines.
//!
//! A [`HandlerChain`] runs ordered, idempotent transformations on a message
//! and fans it out in parallel to one or more destinations:
//!
//! - **Processors** run sequentially on the caller's task: filters gate the
//!   pipeline, transformers replace the content, generic processors perform
//!   side effects. The first error fails the message; a filter returning
//!   `false` drops it successfully.
//! - **Destinations** run concurrently, each with its own deep-cloned
//!   context and optional bounded retry. All destinations run to completion;
//!   partial successes are remembered so replay only re-drives the failures.
//! - **Failures** are captured as a serializable [`Message`] snapshot and
//!   written to a durable failure store; the replay listener re-drives them,
//!   skipping already-delivered destinations, and dead-letters messages that
//!   exhaust their retry budget.
//!
//! The engine offers at-least-once semantics with effectual skip of
//! previously succeeded destinations; handlers are expected to be
//! idempotent.
//!
//! ## Example
//!
//! ```rust,ignore
//! let chain = HandlerChain::new(
//!     "orders",
//!     vec![
//!         Processor::filter("open_orders", OpenOrderFilter),
//!         Processor::transformer("price", PriceCalculator),
//!     ],
//!     vec![Destination::new("warehouse", WarehouseApi).with_retry(RetryConfig::default())],
//!     failure_store,
//!     Some(ReplayConfig::new(
//!         Duration::from_secs(5),
//!         3,
//!         Duration::from_secs(2),
//!         dead_letter_store,
//!     )),
//! )?;
//!
//! let outcome = chain.execute(serde_json::json!({"orderId": "OR00001"})).await;
//! ```

pub mod chain;
pub mod context;
pub mod error;
pub mod handler;
pub mod message;
pub mod replay;
pub mod retry;

pub use chain::{ExecutionSuccess, HandlerChain};
pub use context::MessageContext;
pub use error::{ConfigError, ConversionError, ExecutionError, HandlerError, HandlerResult};
pub use handler::{
    Destination, DestinationHandler, FilterHandler, GenericHandler, Processor, ProcessorKind,
    TransformerHandler,
};
pub use message::{ErrorInfo, Message, MessageMetadata};
pub use replay::ReplayConfig;
pub use retry::RetryConfig;

// Re-export the store capability so chain consumers need only this crate.
pub use flowline_store::{Envelope, EnvelopeId, InMemoryStore, MessageStore, StoreError};

//! # Flowline Store
//!
//! Durable message store capability consumed by flowline handler chains for
//! failed-message persistence, replay, and dead-lettering.
//!
//! This crate provides:
//! - The [`MessageStore`] trait: `store` / `retrieve` / `acknowledge`
//!   semantics over opaque JSON payloads
//! - [`Envelope`] and [`EnvelopeId`] wire types
//! - A fully functional, thread-safe [`InMemoryStore`] with in-flight
//!   tracking and redelivery on negative acknowledgement
//!
//! The in-memory provider is intended for:
//! - Unit and integration testing of store consumers
//! - Development and prototyping
//! - Reference implementation for durable backends (databases, brokers)
//!
//! Durable backends implement [`MessageStore`] and plug into a handler chain
//! unchanged; the engine only ever sees the trait.

pub mod envelope;
pub mod error;
pub mod memory;
pub mod store;

pub use envelope::{Envelope, EnvelopeId};
pub use error::StoreError;
pub use memory::{InMemoryStore, InMemoryStoreConfig};
pub use store::MessageStore;

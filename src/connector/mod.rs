//! # Connector Layer
//!
//! External integrations implementing the application ports:
//! - Inference runtime over HTTP, with event-stream decoding for streamed replies
//! - Knowledge base retrieval
//! - Artifact stores (HTTP, local directory, in-memory)
//! - Mock backend for offline runs
//! - Container and terminal controllers

pub mod adapter;
pub mod api;

pub use adapter::*;
pub use api::*;

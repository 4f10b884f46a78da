//! # Domain Layer
//!
//! Conversation model, protocol selection types and the generation job record.
//! This layer is independent of transports and external services.

pub mod error;
pub mod models;

pub use error::*;
pub use models::*;

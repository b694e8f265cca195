//! Core types shared across barq crates
//!
//! Provides the error domain and request-id generation used by the
//! invocation engine and its HTTP surface.

pub mod error;
pub mod request_id;

pub use error::BarqError;
pub use request_id::RequestId;

//! Core types shared across the CareBridge portal crates.
//!
//! This crate provides the `Result` alias used at fallible set-up boundaries
//! and the strongly-typed identifiers that travel between the portal host,
//! the API interceptor and the chat bridge.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ChatSessionId, ParseIdError, RequestId};

//! Identity provider integration for the CareBridge portal.
//!
//! This crate provides:
//!
//! - **Identity provider**: the `IdentityProvider` seam and an OAuth2
//!   authorization-code implementation (`OAuthProvider`)
//! - **Token store**: the process-wide credential cache with serialized,
//!   single-flight refresh (`TokenStore`, `RefreshPolicy`)
//! - **Session context**: the session lifecycle state machine with
//!   generation-tagged identity checks (`SessionContext`)

pub mod context;
pub mod error;
pub mod oauth;
pub mod policy;
pub mod provider;
pub mod store;

pub use context::SessionContext;
pub use error::{IdentityError, RefreshError};
pub use oauth::OAuthProvider;
pub use policy::RefreshPolicy;
pub use provider::{IdentityProvider, LoginRequest};
pub use store::TokenStore;

#[cfg(test)]
pub(crate) mod testing;

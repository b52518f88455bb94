//! Identity, roles and route guarding for the CareBridge portal.
//!
//! This crate provides:
//! - Closed role set and role mapping (`Role`, `RoleSet`, `RoleMapping`)
//! - Bearer tokens with expiry (`Token`, `TokenPair`)
//! - Session data and lifecycle states (`Identity`, `Session`, `SessionState`)
//! - Route guarding (`RouteRequirement`, `RouteGuardDecision`, `evaluate`)
//! - Identity provider configuration (`OidcConfig`)
//!
//! # Example
//!
//! ```
//! use carebridge_platform_access::{
//!     Identity, Role, RoleSet, RouteGuardDecision, RouteRequirement, SessionState, guard,
//! };
//!
//! let state = SessionState::Authenticated(Identity::new(
//!     "3f1c9a",
//!     RoleSet::from_roles([Role::Patient]),
//! ));
//!
//! let doctors_only = RouteRequirement::any_of([Role::Practitioner]);
//! assert_eq!(
//!     guard::evaluate(&state, &doctors_only, "/doctor/schedule"),
//!     RouteGuardDecision::RedirectToUnauthorized,
//! );
//! ```

pub mod claims;
pub mod error;
pub mod guard;
pub mod oidc;
pub mod role;
pub mod session;
pub mod token;

pub use claims::{IdTokenClaims, RoleMapping};
pub use error::{AuthInitFailure, AuthenticationError};
pub use guard::{RouteGuardDecision, RouteRequirement};
pub use oidc::OidcConfig;
pub use role::{Role, RoleSet};
pub use session::{Identity, Session, SessionState};
pub use token::{Token, TokenPair};

//! CareBridge telehealth portal host.
//!
//! This crate provides the axum web host for the portal: sign-in through the
//! identity provider, role-gated patient, practitioner and administration
//! areas, an authenticated proxy to the backend API, and the care assistant
//! chat endpoint.

pub mod app;
pub mod auth;
pub mod chat;
pub mod config;
pub mod pages;
pub mod proxy;
pub mod session;
pub mod state;

pub use app::router;
pub use config::PortalConfig;
pub use state::AppState;

#[cfg(test)]
pub(crate) mod testing;

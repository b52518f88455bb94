//! Backend API access for the CareBridge portal.
//!
//! This crate provides:
//!
//! - **Envelope**: normalized results (`ApiResponse`, `ApiFailure`)
//! - **Transport**: the `HttpTransport` seam and a reqwest implementation
//! - **Interceptor**: bearer attachment with refresh-then-retry
//!   (`AuthInterceptor`, `ReauthHandler`)
//! - **Client**: REST verbs over the above (`ApiClient`, `RequestConfig`)

pub mod client;
pub mod envelope;
pub mod error;
pub mod interceptor;
pub mod transport;

pub use client::{ApiClient, RequestConfig, clamp_timeout};
pub use envelope::{ApiFailure, ApiResponse, ApiResult, to_envelope};
pub use error::{ApiError, TransportError};
pub use interceptor::{AuthInterceptor, ReauthHandler};
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};

#[cfg(test)]
pub(crate) mod testing;

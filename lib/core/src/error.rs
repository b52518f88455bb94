//! Error handling foundation for the CareBridge portal.
//!
//! Only the `Result` alias lives here. Each crate defines its own domain
//! error enums in its own `error` module and wraps them in a rootcause
//! `Report` where a boundary needs layered context.

use rootcause::Report;

/// A Result type alias using rootcause's Report for error handling.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

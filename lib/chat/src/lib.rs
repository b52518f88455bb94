//! Care assistant chat for the CareBridge portal.
//!
//! Messages are relayed to an external workflow-automation webhook. The
//! bridge turns each exchange into the ordered event sequence the portal
//! pushes to the browser: typing on, a response or an error, typing off.

pub mod bridge;
pub mod error;
pub mod event;
pub mod relay;

pub use bridge::ChatBridge;
pub use error::ChatError;
pub use event::{ChatEvent, ChatMessage};
pub use relay::{ChatRelay, WebhookRelay};

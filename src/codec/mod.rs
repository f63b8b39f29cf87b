//! Conversion between domain messages and what travels on the wire.
//!
//! The driver is agnostic to how message bodies and headers are encoded: it delegates to a
//! [`MessageCodec`]. [`JsonCodec`] covers the common case of JSON-encoded payloads.
mod json;

pub use json::{JsonCodec, MESSAGE_TYPE_HEADER};

use crate::consumers::MessageDelivery;
use crate::transport::{WireDelivery, WireMessage};

/// `MessageCodec` converts domain messages into [`WireMessage`]s before publishing and
/// [`WireDelivery`]s into [`MessageDelivery`]s before they reach a handler.
pub trait MessageCodec: Send + Sync + 'static {
    /// The domain representation of a message.
    type Message: Send + 'static;

    /// Encode `message`.
    ///
    /// `persistent` messages must be marked as such in the returned properties (delivery mode 2)
    /// so that they survive a broker restart when routed to a durable queue.
    fn encode(&self, message: &Self::Message, persistent: bool)
        -> Result<WireMessage, anyhow::Error>;

    /// Decode a delivery consumed from `queue`.
    fn decode(
        &self,
        delivery: WireDelivery,
        queue: &str,
    ) -> Result<MessageDelivery<Self::Message>, anyhow::Error>;
}

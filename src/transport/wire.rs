use amq_protocol_types::{DeliveryTag, ShortString};
use lapin::BasicProperties;
use std::fmt;
use std::time::Duration;

/// A message ready to be published: the encoded payload and its AMQP properties.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct WireMessage {
    /// The payload of the message in binary format.
    pub payload: Vec<u8>,
    /// Contains the properties and the headers of the message.
    pub properties: BasicProperties,
}

/// A message received from the broker, before it is decoded.
#[derive(Debug, Clone, PartialEq)]
pub struct WireDelivery {
    /// The delivery tag of the message.
    pub delivery_tag: DeliveryTag,

    /// The exchange of the message. May be an empty string
    /// if the default exchange is used.
    pub exchange: ShortString,

    /// The routing key of the message. May be an empty string
    /// if no routing key is specified.
    pub routing_key: ShortString,

    /// Whether this message was redelivered
    pub redelivered: bool,

    /// Contains the properties and the headers of the
    /// message.
    pub properties: BasicProperties,

    /// The payload of the message in binary format.
    pub data: Vec<u8>,
}

impl From<lapin::message::Delivery> for WireDelivery {
    fn from(value: lapin::message::Delivery) -> Self {
        Self {
            delivery_tag: value.delivery_tag,
            exchange: value.exchange,
            routing_key: value.routing_key,
            redelivered: value.redelivered,
            properties: value.properties,
            data: value.data,
        }
    }
}

/// The broker-assigned identifier of a consumer registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsumerTag(String);

impl ConsumerTag {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConsumerTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for ConsumerTag {
    fn from(tag: String) -> Self {
        Self(tag)
    }
}

impl From<&str> for ConsumerTag {
    fn from(tag: &str) -> Self {
        Self(tag.to_owned())
    }
}

/// How long [`Consumer::wait_for_activity`](super::Consumer::wait_for_activity) may wait.
///
/// `Indefinite` is distinct from `Bounded(Duration::ZERO)`: the latter returns straight away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeout {
    /// Wait until a delivery is ready or the wait fails.
    Indefinite,
    /// Wait at most this long.
    Bounded(Duration),
}

/// The outcome of a successful wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    /// This many deliveries are ready to be processed.
    Ready(usize),
    /// The wait timed out with nothing ready.
    Idle,
}

/// A failure while waiting for broker activity.
///
/// `detail` is `None` when the underlying client could not say what went wrong
/// (e.g. the delivery stream simply ended).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error(
    "Waiting for broker activity failed: {}",
    .detail.as_deref().unwrap_or("no further detail")
)]
pub struct WaitError {
    detail: Option<String>,
    io_kind: Option<std::io::ErrorKind>,
}

impl WaitError {
    /// A failure the underlying client reported without any information.
    pub fn without_detail() -> Self {
        Self {
            detail: None,
            io_kind: None,
        }
    }

    /// A failure described by a message.
    pub fn with_detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            io_kind: None,
        }
    }

    /// A failure of the underlying socket.
    pub fn from_io(error: &std::io::Error) -> Self {
        Self {
            detail: Some(error.to_string()),
            io_kind: Some(error.kind()),
        }
    }

    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }

    pub fn io_kind(&self) -> Option<std::io::ErrorKind> {
        self.io_kind
    }
}

impl From<lapin::Error> for WaitError {
    fn from(error: lapin::Error) -> Self {
        match &error {
            lapin::Error::IOError(io) => Self::from_io(io),
            _ => Self::with_detail(error.to_string()),
        }
    }
}

//! Declarative descriptions of exchanges, queues and bindings.
//!
//! These are plain values: they carry no connection to the broker and are consumed by the
//! topology operations of [`AmqpDriver`](crate::driver::AmqpDriver).
use crate::amqp::types::{AMQPValue, FieldTable};
use crate::amqp::ExchangeKind;

/// An exchange to be declared on the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeDefinition {
    pub name: String,
    pub kind: ExchangeKind,
    /// The exchange survives a broker restart.
    pub durable: bool,
    /// The exchange is deleted once the last queue or exchange bound to it is unbound.
    pub auto_delete: bool,
    /// The exchange cannot be published to directly, only through exchange-to-exchange bindings.
    pub internal: bool,
    pub arguments: FieldTable,
}

impl ExchangeDefinition {
    /// A durable, non-internal exchange that is never deleted automatically.
    pub fn durable(name: impl Into<String>, kind: ExchangeKind) -> Self {
        Self {
            name: name.into(),
            kind,
            durable: true,
            auto_delete: false,
            internal: false,
            arguments: FieldTable::default(),
        }
    }

    #[must_use]
    pub fn with_argument(mut self, key: &str, value: AMQPValue) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }
}

/// A queue to be declared on the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueDefinition {
    pub name: String,
    /// The queue survives a broker restart.
    ///
    /// Messages published as transient are still discarded during recovery, even if they were
    /// stored in a durable queue.
    pub durable: bool,
    /// The queue is used by only one connection and it will be deleted when that connection closes.
    pub exclusive: bool,
    /// The queue is deleted once its last consumer unsubscribes.
    pub auto_delete: bool,
    /// Optional queue arguments, e.g. `x-max-length` or `x-dead-letter-exchange`.
    pub arguments: FieldTable,
}

impl QueueDefinition {
    /// A durable, shared queue that is never deleted automatically.
    pub fn durable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: true,
            exclusive: false,
            auto_delete: false,
            arguments: FieldTable::default(),
        }
    }

    /// A queue that only lives as long as the connection that declared it.
    pub fn transient(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            durable: false,
            exclusive: true,
            auto_delete: true,
            arguments: FieldTable::default(),
        }
    }

    #[must_use]
    pub fn with_argument(mut self, key: &str, value: AMQPValue) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }
}

/// A binding from a source exchange to a destination (a queue or another exchange).
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// The exchange messages are routed from.
    pub source: String,
    /// The queue or exchange messages are routed to.
    pub destination: String,
    pub routing_key: String,
    pub arguments: FieldTable,
}

impl Binding {
    pub fn new(
        source: impl Into<String>,
        destination: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            routing_key: routing_key.into(),
            arguments: FieldTable::default(),
        }
    }

    #[must_use]
    pub fn with_argument(mut self, key: &str, value: AMQPValue) -> Self {
        self.arguments.insert(key.into(), value);
        self
    }
}

/// What the broker reports about a queue when it is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueState {
    /// Messages ready to be delivered.
    pub message_count: u32,
    /// Active consumers.
    pub consumer_count: u32,
}

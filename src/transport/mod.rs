//! The capabilities [`AmqpDriver`](crate::driver::AmqpDriver) requires from an AMQP client.
//!
//! The driver never talks to `lapin` directly: it goes through [`ConnectionProvider`],
//! [`Connection`], [`Channel`] and [`Consumer`].
//! The `lapin` implementation lives in [`rabbit_mq`]; tests (or alternative clients) can plug
//! in their own.
mod rabbit_mq;
mod wire;

pub use rabbit_mq::RabbitMqConsumer;
pub use wire::{ConsumerTag, Readiness, WaitError, WaitTimeout, WireDelivery, WireMessage};

use amq_protocol_types::DeliveryTag;

use crate::amqp::configuration::ConsumerSettings;
use crate::amqp::options::{BasicPublishOptions, ExchangeDeleteOptions, QueueDeleteOptions};
use crate::topology::{Binding, ExchangeDefinition, QueueDefinition, QueueState};

/// `ConnectionProvider` supplies broker connections on demand.
///
/// The driver asks for a connection the first time it needs a channel and caches it for the
/// rest of its lifetime: it never closes it and never asks for a new one.
///
/// # Note
///
/// Whether a new connection is established or an existing one is handed out (e.g. borrowed
/// from a pool) is up to the specific implementation.
#[async_trait::async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// The connection type handed out by this provider.
    type Connection: Connection;

    /// Get a [`Self::Connection`].
    ///
    /// Fails if no connection can be established.
    async fn get_connection(&self) -> Result<Self::Connection, anyhow::Error>;
}

/// The channel type opened on the connections handed out by `P`.
pub type ChannelOf<P> = <<P as ConnectionProvider>::Connection as Connection>::Channel;

/// A session with the broker, on top of which channels are multiplexed.
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
    /// The channel type opened by this connection.
    type Channel: Channel;

    /// Open a new channel on this connection.
    async fn open_channel(&self) -> Result<Self::Channel, anyhow::Error>;
}

/// A protocol channel: the unit on which every AMQP method is issued.
///
/// Channels are cheap handles: cloning a channel gives you another handle to the same
/// protocol channel, which is how a [`StopHandle`](crate::driver::StopHandle) can cancel a
/// consumer registration while the consume loop is running.
#[async_trait::async_trait]
pub trait Channel: Clone + Send + Sync + 'static {
    /// The subscription returned when registering a consumer.
    type Consumer: Consumer;

    /// Whether the channel can still be used.
    ///
    /// The broker closes a channel when a method fails on it (e.g. declaring a queue with
    /// conflicting settings), so an open channel can become unusable without being closed by us.
    fn is_open(&self) -> bool;

    /// `basic.publish` a message on `exchange` with `routing_key`.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: BasicPublishOptions,
        message: WireMessage,
    ) -> Result<(), anyhow::Error>;

    /// Register a consumer on `queue`.
    ///
    /// Deliveries are buffered by the returned [`Consumer`] until the consume loop drains them.
    async fn register_consumer(
        &self,
        queue: &str,
        settings: &ConsumerSettings,
    ) -> Result<Self::Consumer, anyhow::Error>;

    /// `basic.cancel` the consumer registered with `tag`.
    async fn cancel_consumer(&self, tag: &ConsumerTag, no_wait: bool)
        -> Result<(), anyhow::Error>;

    /// `basic.ack` a single delivery.
    async fn ack(&self, delivery_tag: DeliveryTag) -> Result<(), anyhow::Error>;

    /// `basic.reject` a single delivery.
    async fn reject(&self, delivery_tag: DeliveryTag, requeue: bool) -> Result<(), anyhow::Error>;

    async fn declare_exchange(&self, definition: &ExchangeDefinition)
        -> Result<(), anyhow::Error>;

    async fn bind_exchange(&self, binding: &Binding) -> Result<(), anyhow::Error>;

    async fn unbind_exchange(&self, binding: &Binding) -> Result<(), anyhow::Error>;

    async fn delete_exchange(
        &self,
        name: &str,
        options: ExchangeDeleteOptions,
    ) -> Result<(), anyhow::Error>;

    async fn declare_queue(
        &self,
        definition: &QueueDefinition,
        passive: bool,
    ) -> Result<QueueState, anyhow::Error>;

    async fn bind_queue(&self, binding: &Binding) -> Result<(), anyhow::Error>;

    async fn unbind_queue(&self, binding: &Binding) -> Result<(), anyhow::Error>;

    /// Returns the number of messages purged.
    async fn purge_queue(&self, name: &str) -> Result<u32, anyhow::Error>;

    async fn delete_queue(&self, name: &str, options: QueueDeleteOptions)
        -> Result<(), anyhow::Error>;

    /// Close the channel. The handle must not be used afterwards.
    async fn close(&self) -> Result<(), anyhow::Error>;
}

/// An active consumer registration.
#[async_trait::async_trait]
pub trait Consumer: Send {
    /// The broker-assigned tag identifying this registration.
    fn tag(&self) -> &ConsumerTag;

    /// Wait until at least one delivery is ready, or `timeout` elapses.
    ///
    /// [`WaitTimeout::Indefinite`] waits until something happens;
    /// a bounded wait of zero returns immediately.
    async fn wait_for_activity(&mut self, timeout: WaitTimeout) -> Result<Readiness, WaitError>;

    /// Drain one wait cycle: every delivery that is ready right now, in arrival order.
    async fn process_one_wait_cycle(&mut self) -> Result<Vec<WireDelivery>, anyhow::Error>;
}

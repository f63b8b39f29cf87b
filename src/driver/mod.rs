//! [`AmqpDriver`] adapts publishing, consuming, acknowledgements and topology management onto an
//! AMQP 0-9-1 channel.
//!
//! ```rust,no_run
//! use carrot_cake_driver::amqp::configuration::RabbitMqSettings;
//! use carrot_cake_driver::amqp::ConnectionFactory;
//! use carrot_cake_driver::codec::JsonCodec;
//! use carrot_cake_driver::consumers::{ClosureHandler, MessageDelivery};
//! use carrot_cake_driver::driver::AmqpDriver;
//! use std::time::Duration;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let factory = ConnectionFactory::new_from_config(&RabbitMqSettings::default())?;
//!     let mut driver = AmqpDriver::new(factory, JsonCodec::<serde_json::Value>::new("order"));
//!
//!     // Print whatever is in `orders`, giving up after 5 seconds without messages.
//!     let mut handler = ClosureHandler(|delivery: MessageDelivery<serde_json::Value>| {
//!         println!("{}", delivery.message);
//!         true
//!     });
//!     driver
//!         .consume("orders", &mut handler, Duration::from_secs(5), None)
//!         .await?;
//!     Ok(())
//! }
//! ```
mod channel_manager;
mod consume;
mod error;
mod interruption;
mod stop;
mod topology;

pub use error::{DriverError, ErrorKind};
pub use interruption::{InterruptionPolicy, SignatureInterruptionPolicy};
pub use stop::StopHandle;

use crate::amqp::configuration::ConsumerSettings;
use crate::amqp::options::BasicPublishOptions;
use crate::codec::MessageCodec;
use crate::consumers::MessageDelivery;
use crate::publishers::MessagePublication;
use crate::transport::{Channel, ChannelOf, ConnectionProvider};
use amq_protocol_types::DeliveryTag;
use channel_manager::ChannelManager;
use shutdown_handler::ShutdownHandler;
use tokio::task::JoinHandle;

/// A driver for a single AMQP channel.
///
/// The channel is opened lazily, on top of a connection obtained once from the
/// [`ConnectionProvider`], and reused by every operation until it is closed, either
/// explicitly via [`close`](Self::close) or at the end of a [`consume`](Self::consume) call.
///
/// # Concurrency
///
/// Operations take `&mut self`: a driver runs one operation at a time.
/// The only way to act on a running consume loop is a [`StopHandle`].
pub struct AmqpDriver<P, M>
where
    P: ConnectionProvider,
    M: MessageCodec,
{
    channels: ChannelManager<P>,
    codec: M,
    consumer_settings: ConsumerSettings,
    interruption_policy: Box<dyn InterruptionPolicy>,
    stop: StopHandle<ChannelOf<P>>,
}

impl<P, M> AmqpDriver<P, M>
where
    P: ConnectionProvider,
    M: MessageCodec,
{
    /// A driver with default [`ConsumerSettings`] and the default [`SignatureInterruptionPolicy`].
    pub fn new(provider: P, codec: M) -> Self {
        Self::builder(provider, codec).build()
    }

    pub fn builder(provider: P, codec: M) -> AmqpDriverBuilder<P, M> {
        AmqpDriverBuilder {
            provider,
            codec,
            consumer_settings: ConsumerSettings::default(),
            interruption_policy: Box::new(SignatureInterruptionPolicy::default()),
        }
    }

    /// Encode and publish a message.
    ///
    /// When publisher confirms are enabled on the channel, it waits for the broker to confirm.
    #[tracing::instrument(name = "amqp_driver_publish", skip(self, publication))]
    pub async fn publish(
        &mut self,
        publication: MessagePublication<M::Message>,
        exchange: &str,
        routing_key: &str,
    ) -> Result<(), DriverError> {
        let options = BasicPublishOptions {
            mandatory: publication.mandatory,
            immediate: publication.immediate,
        };
        let result = async {
            let message = self
                .codec
                .encode(&publication.message, publication.persistent)?;
            let channel = self.channels.get_channel().await?;
            channel.publish(exchange, routing_key, options, message).await
        }
        .await;
        result.map_err(|cause| {
            DriverError::new(
                ErrorKind::PublishFailed,
                format!(
                    "Failed to publish a message to exchange `{exchange}` with routing key `{routing_key}`"
                ),
                cause,
            )
        })
    }

    /// Acknowledge `delivery` on the current channel.
    ///
    /// Delivery tags are only valid on the channel the delivery was received on, and
    /// [`consume`](Self::consume) closes its channel when it returns. Prefer
    /// [`ConsumeSession::ack`](crate::consumers::ConsumeSession::ack) from within a handler.
    #[tracing::instrument(name = "amqp_driver_ack", skip_all, fields(delivery_tag = delivery.delivery_tag))]
    pub async fn ack(&mut self, delivery: &MessageDelivery<M::Message>) -> Result<(), DriverError> {
        match self.channels.get_channel().await {
            Ok(channel) => acknowledge(channel, delivery.delivery_tag).await,
            Err(cause) => Err(ack_failed(delivery.delivery_tag, cause)),
        }
    }

    /// Reject `delivery` on the current channel, asking the broker to requeue it.
    ///
    /// The same caveats as [`ack`](Self::ack) apply.
    #[tracing::instrument(name = "amqp_driver_reject", skip_all, fields(delivery_tag = delivery.delivery_tag))]
    pub async fn reject(
        &mut self,
        delivery: &MessageDelivery<M::Message>,
    ) -> Result<(), DriverError> {
        match self.channels.get_channel().await {
            Ok(channel) => reject(channel, delivery.delivery_tag).await,
            Err(cause) => Err(reject_failed(delivery.delivery_tag, cause)),
        }
    }

    /// Close and forget the current channel, if any.
    ///
    /// The next operation opens a new channel. The connection stays open.
    #[tracing::instrument(name = "amqp_driver_close", skip(self))]
    pub async fn close(&mut self) -> Result<(), DriverError> {
        self.channels.close_channel().await.map_err(|cause| {
            DriverError::new(ErrorKind::CloseFailed, "Failed to close the channel", cause)
        })
    }

    /// Stop consuming, for good. See [`StopHandle::stop`].
    pub fn stop(&self) {
        self.stop.stop()
    }

    /// A handle to stop this driver from another task or thread, e.g. while
    /// [`consume`](Self::consume) is running.
    pub fn stop_handle(&self) -> StopHandle<ChannelOf<P>> {
        self.stop.clone()
    }

    /// Stop this driver when the process receives SIGTERM.
    pub fn stop_on_sigterm(&self) -> Result<JoinHandle<()>, anyhow::Error> {
        Ok(self.stop.stop_on_shutdown(ShutdownHandler::sigterm()?))
    }
}

/// Configure an [`AmqpDriver`] before building it.
///
/// Use [`AmqpDriver::builder`] as entrypoint.
pub struct AmqpDriverBuilder<P, M> {
    provider: P,
    codec: M,
    consumer_settings: ConsumerSettings,
    interruption_policy: Box<dyn InterruptionPolicy>,
}

impl<P, M> AmqpDriverBuilder<P, M>
where
    P: ConnectionProvider,
    M: MessageCodec,
{
    /// Prefetch count, priority and exclusivity of the consumers registered by the driver.
    #[must_use]
    pub fn consumer_settings(mut self, settings: ConsumerSettings) -> Self {
        self.consumer_settings = settings;
        self
    }

    /// Decide which wait failures end a consume loop quietly.
    /// If not configured, [`SignatureInterruptionPolicy::default`] is used.
    #[must_use]
    pub fn interruption_policy(mut self, policy: impl InterruptionPolicy + 'static) -> Self {
        self.interruption_policy = Box::new(policy);
        self
    }

    pub fn build(self) -> AmqpDriver<P, M> {
        AmqpDriver {
            channels: ChannelManager::new(self.provider),
            codec: self.codec,
            consumer_settings: self.consumer_settings,
            interruption_policy: self.interruption_policy,
            stop: StopHandle::new(),
        }
    }
}

pub(crate) async fn acknowledge<C: Channel>(
    channel: &C,
    delivery_tag: DeliveryTag,
) -> Result<(), DriverError> {
    channel
        .ack(delivery_tag)
        .await
        .map_err(|cause| ack_failed(delivery_tag, cause))
}

pub(crate) async fn reject<C: Channel>(
    channel: &C,
    delivery_tag: DeliveryTag,
) -> Result<(), DriverError> {
    channel
        .reject(delivery_tag, true)
        .await
        .map_err(|cause| reject_failed(delivery_tag, cause))
}

fn ack_failed(delivery_tag: DeliveryTag, cause: anyhow::Error) -> DriverError {
    DriverError::new(
        ErrorKind::AckFailed,
        format!("Failed to ack delivery {delivery_tag}"),
        cause,
    )
}

fn reject_failed(delivery_tag: DeliveryTag, cause: anyhow::Error) -> DriverError {
    DriverError::new(
        ErrorKind::RejectFailed,
        format!("Failed to reject delivery {delivery_tag}"),
        cause,
    )
}

use super::{AmqpDriver, DriverError, ErrorKind};
use crate::amqp::options::{ExchangeDeleteOptions, QueueDeleteOptions};
use crate::codec::MessageCodec;
use crate::topology::{Binding, ExchangeDefinition, QueueDefinition, QueueState};
use crate::transport::{Channel, ConnectionProvider};

/// Topology management.
///
/// Each operation issues exactly one protocol call on the driver's channel and is never
/// retried. Keep in mind that the broker closes the channel when a call fails: the driver
/// opens a new one for the next operation.
impl<P, M> AmqpDriver<P, M>
where
    P: ConnectionProvider,
    M: MessageCodec,
{
    #[tracing::instrument(name = "amqp_driver_declare_exchange", skip_all, fields(exchange = %definition.name))]
    pub async fn declare_exchange(
        &mut self,
        definition: &ExchangeDefinition,
    ) -> Result<(), DriverError> {
        let result = async {
            let channel = self.channels.get_channel().await?;
            channel.declare_exchange(definition).await
        }
        .await;
        result.map_err(|cause| {
            DriverError::new(
                ErrorKind::ExchangeDeclareFailed,
                format!("Failed to declare exchange `{}`", definition.name),
                cause,
            )
        })
    }

    /// Bind `binding.destination` (an exchange) to `binding.source`.
    #[tracing::instrument(name = "amqp_driver_bind_exchange", skip(self))]
    pub async fn bind_exchange(&mut self, binding: &Binding) -> Result<(), DriverError> {
        let result = async {
            let channel = self.channels.get_channel().await?;
            channel.bind_exchange(binding).await
        }
        .await;
        result.map_err(|cause| {
            DriverError::new(
                ErrorKind::ExchangeBindFailed,
                format!(
                    "Failed to bind exchange `{}` to exchange `{}` with routing key `{}`",
                    binding.destination, binding.source, binding.routing_key
                ),
                cause,
            )
        })
    }

    #[tracing::instrument(name = "amqp_driver_unbind_exchange", skip(self))]
    pub async fn unbind_exchange(&mut self, binding: &Binding) -> Result<(), DriverError> {
        let result = async {
            let channel = self.channels.get_channel().await?;
            channel.unbind_exchange(binding).await
        }
        .await;
        result.map_err(|cause| {
            DriverError::new(
                ErrorKind::ExchangeUnbindFailed,
                format!(
                    "Failed to unbind exchange `{}` from exchange `{}` with routing key `{}`",
                    binding.destination, binding.source, binding.routing_key
                ),
                cause,
            )
        })
    }

    #[tracing::instrument(name = "amqp_driver_delete_exchange", skip(self))]
    pub async fn delete_exchange(
        &mut self,
        name: &str,
        options: ExchangeDeleteOptions,
    ) -> Result<(), DriverError> {
        let result = async {
            let channel = self.channels.get_channel().await?;
            channel.delete_exchange(name, options).await
        }
        .await;
        result.map_err(|cause| {
            DriverError::new(
                ErrorKind::ExchangeDeleteFailed,
                format!("Failed to delete exchange `{name}`"),
                cause,
            )
        })
    }

    /// Declare a queue, returning what the broker reports about it.
    #[tracing::instrument(name = "amqp_driver_declare_queue", skip_all, fields(queue = %definition.name))]
    pub async fn declare_queue(
        &mut self,
        definition: &QueueDefinition,
    ) -> Result<QueueState, DriverError> {
        let result = async {
            let channel = self.channels.get_channel().await?;
            channel.declare_queue(definition, false).await
        }
        .await;
        result.map_err(|cause| {
            DriverError::new(
                ErrorKind::QueueDeclareFailed,
                format!("Failed to declare queue `{}`", definition.name),
                cause,
            )
        })
    }

    /// The number of messages ready in `queue`.
    ///
    /// It issues a passive declare: it fails if the queue does not exist.
    #[tracing::instrument(name = "amqp_driver_queue_message_count", skip(self))]
    pub async fn queue_message_count(&mut self, queue: &str) -> Result<u32, DriverError> {
        let result = async {
            let channel = self.channels.get_channel().await?;
            channel
                .declare_queue(&QueueDefinition::durable(queue), true)
                .await
        }
        .await;
        result
            .map(|state| state.message_count)
            .map_err(|cause| {
                DriverError::new(
                    ErrorKind::QueueDeclareFailed,
                    format!("Failed to inspect queue `{queue}`"),
                    cause,
                )
            })
    }

    /// Bind `binding.destination` (a queue) to `binding.source`.
    #[tracing::instrument(name = "amqp_driver_bind_queue", skip(self))]
    pub async fn bind_queue(&mut self, binding: &Binding) -> Result<(), DriverError> {
        let result = async {
            let channel = self.channels.get_channel().await?;
            channel.bind_queue(binding).await
        }
        .await;
        result.map_err(|cause| {
            DriverError::new(
                ErrorKind::QueueBindFailed,
                format!(
                    "Failed to bind queue `{}` to exchange `{}` with routing key `{}`",
                    binding.destination, binding.source, binding.routing_key
                ),
                cause,
            )
        })
    }

    #[tracing::instrument(name = "amqp_driver_unbind_queue", skip(self))]
    pub async fn unbind_queue(&mut self, binding: &Binding) -> Result<(), DriverError> {
        let result = async {
            let channel = self.channels.get_channel().await?;
            channel.unbind_queue(binding).await
        }
        .await;
        result.map_err(|cause| {
            DriverError::new(
                ErrorKind::QueueUnbindFailed,
                format!(
                    "Failed to unbind queue `{}` from exchange `{}` with routing key `{}`",
                    binding.destination, binding.source, binding.routing_key
                ),
                cause,
            )
        })
    }

    /// Drop every message ready in `queue`, returning how many were dropped.
    ///
    /// Unacknowledged deliveries are not affected.
    #[tracing::instrument(name = "amqp_driver_purge_queue", skip(self))]
    pub async fn purge_queue(&mut self, queue: &str) -> Result<u32, DriverError> {
        let result = async {
            let channel = self.channels.get_channel().await?;
            channel.purge_queue(queue).await
        }
        .await;
        result.map_err(|cause| {
            DriverError::new(
                ErrorKind::QueuePurgeFailed,
                format!("Failed to purge queue `{queue}`"),
                cause,
            )
        })
    }

    #[tracing::instrument(name = "amqp_driver_delete_queue", skip(self))]
    pub async fn delete_queue(
        &mut self,
        queue: &str,
        options: QueueDeleteOptions,
    ) -> Result<(), DriverError> {
        let result = async {
            let channel = self.channels.get_channel().await?;
            channel.delete_queue(queue, options).await
        }
        .await;
        result.map_err(|cause| {
            DriverError::new(
                ErrorKind::QueueDeleteFailed,
                format!("Failed to delete queue `{queue}`"),
                cause,
            )
        })
    }
}

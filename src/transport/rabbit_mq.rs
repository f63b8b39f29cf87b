//! [`lapin`] implementation of the transport capabilities.
//!
//! [`lapin`]: https://docs.rs/crate/lapin
use super::{
    Channel, Connection, ConnectionProvider, Consumer, ConsumerTag, Readiness, WaitError,
    WaitTimeout, WireDelivery, WireMessage,
};
use crate::amqp::configuration::ConsumerSettings;
use crate::amqp::ConnectionFactory;
use crate::topology::{Binding, ExchangeDefinition, QueueDefinition, QueueState};
use amq_protocol_types::{AMQPValue, DeliveryTag, FieldTable};
use futures_util::{FutureExt, Stream, StreamExt};
use lapin::options::{
    BasicAckOptions, BasicCancelOptions, BasicConsumeOptions, BasicPublishOptions,
    BasicQosOptions, BasicRejectOptions, ExchangeBindOptions, ExchangeDeclareOptions,
    ExchangeDeleteOptions, ExchangeUnbindOptions, QueueBindOptions, QueueDeclareOptions,
    QueueDeleteOptions, QueuePurgeOptions,
};
use lapin::publisher_confirm::Confirmation;
use std::collections::VecDeque;
use uuid::Uuid;

/// Reply code sent with `channel.close` when the driver is done with a channel.
const REPLY_SUCCESS: u16 = 200;

#[async_trait::async_trait]
impl ConnectionProvider for ConnectionFactory {
    type Connection = lapin::Connection;

    async fn get_connection(&self) -> Result<Self::Connection, anyhow::Error> {
        self.new_connection().await
    }
}

#[async_trait::async_trait]
impl Connection for lapin::Connection {
    type Channel = lapin::Channel;

    #[tracing::instrument(name = "rabbitmq_create_channel", skip(self))]
    async fn open_channel(&self) -> Result<lapin::Channel, anyhow::Error> {
        Ok(self.create_channel().await?)
    }
}

#[async_trait::async_trait]
impl Channel for lapin::Channel {
    type Consumer = RabbitMqConsumer;

    fn is_open(&self) -> bool {
        self.status().connected()
    }

    #[tracing::instrument(level = "debug", skip(self, message))]
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        options: BasicPublishOptions,
        message: WireMessage,
    ) -> Result<(), anyhow::Error> {
        let confirm = self
            .basic_publish(
                exchange,
                routing_key,
                options,
                &message.payload,
                message.properties,
            )
            .await?
            .await?;

        match confirm {
            Confirmation::Ack(Some(return_message)) if return_message.reply_code == 312 => {
                // Reply Code 312 - NO_ROUTE
                // See https://www.rabbitmq.com/amqp-0-9-1-reference.html
                Err(anyhow::anyhow!(
                    "The message could not be routed: {:?}",
                    return_message
                ))
            }
            Confirmation::Nack(nack) => Err(anyhow::anyhow!(
                "The RabbitMq broker nacked the publishing of the message: {:?}",
                nack
            )),
            Confirmation::Ack(_) | Confirmation::NotRequested => Ok(()),
        }
    }

    #[tracing::instrument(name = "rabbitmq_basic_consume", skip(self))]
    async fn register_consumer(
        &self,
        queue: &str,
        settings: &ConsumerSettings,
    ) -> Result<RabbitMqConsumer, anyhow::Error> {
        if let Some(prefetch_count) = settings.prefetch_count {
            self.basic_qos(prefetch_count, BasicQosOptions { global: false })
                .await?;
        }

        let mut arguments = FieldTable::default();
        if let Some(priority) = settings.priority {
            arguments.insert("x-priority".into(), AMQPValue::LongInt(priority));
        }

        let consumer = self
            .basic_consume(
                queue,
                &Uuid::new_v4().to_string(),
                BasicConsumeOptions {
                    exclusive: settings.exclusive,
                    ..BasicConsumeOptions::default()
                },
                arguments,
            )
            .await?;

        Ok(RabbitMqConsumer::new(consumer))
    }

    async fn cancel_consumer(
        &self,
        tag: &ConsumerTag,
        no_wait: bool,
    ) -> Result<(), anyhow::Error> {
        self.basic_cancel(tag.as_str(), BasicCancelOptions { nowait: no_wait })
            .await?;
        Ok(())
    }

    async fn ack(&self, delivery_tag: DeliveryTag) -> Result<(), anyhow::Error> {
        self.basic_ack(delivery_tag, BasicAckOptions { multiple: false })
            .await?;
        Ok(())
    }

    async fn reject(&self, delivery_tag: DeliveryTag, requeue: bool) -> Result<(), anyhow::Error> {
        self.basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await?;
        Ok(())
    }

    async fn declare_exchange(
        &self,
        definition: &ExchangeDefinition,
    ) -> Result<(), anyhow::Error> {
        let options = ExchangeDeclareOptions {
            passive: false,
            durable: definition.durable,
            auto_delete: definition.auto_delete,
            internal: definition.internal,
            nowait: false,
        };
        self.exchange_declare(
            &definition.name,
            definition.kind.clone(),
            options,
            definition.arguments.clone(),
        )
        .await?;
        Ok(())
    }

    async fn bind_exchange(&self, binding: &Binding) -> Result<(), anyhow::Error> {
        self.exchange_bind(
            &binding.destination,
            &binding.source,
            &binding.routing_key,
            ExchangeBindOptions { nowait: false },
            binding.arguments.clone(),
        )
        .await?;
        Ok(())
    }

    async fn unbind_exchange(&self, binding: &Binding) -> Result<(), anyhow::Error> {
        self.exchange_unbind(
            &binding.destination,
            &binding.source,
            &binding.routing_key,
            ExchangeUnbindOptions { nowait: false },
            binding.arguments.clone(),
        )
        .await?;
        Ok(())
    }

    async fn delete_exchange(
        &self,
        name: &str,
        options: ExchangeDeleteOptions,
    ) -> Result<(), anyhow::Error> {
        self.exchange_delete(name, options).await?;
        Ok(())
    }

    async fn declare_queue(
        &self,
        definition: &QueueDefinition,
        passive: bool,
    ) -> Result<QueueState, anyhow::Error> {
        let options = QueueDeclareOptions {
            passive,
            durable: definition.durable,
            exclusive: definition.exclusive,
            auto_delete: definition.auto_delete,
            nowait: false,
        };
        let queue = self
            .queue_declare(&definition.name, options, definition.arguments.clone())
            .await?;
        Ok(QueueState {
            message_count: queue.message_count(),
            consumer_count: queue.consumer_count(),
        })
    }

    async fn bind_queue(&self, binding: &Binding) -> Result<(), anyhow::Error> {
        self.queue_bind(
            &binding.destination,
            &binding.source,
            &binding.routing_key,
            QueueBindOptions { nowait: false },
            binding.arguments.clone(),
        )
        .await?;
        Ok(())
    }

    async fn unbind_queue(&self, binding: &Binding) -> Result<(), anyhow::Error> {
        self.queue_unbind(
            &binding.destination,
            &binding.source,
            &binding.routing_key,
            binding.arguments.clone(),
        )
        .await?;
        Ok(())
    }

    async fn purge_queue(&self, name: &str) -> Result<u32, anyhow::Error> {
        Ok(self
            .queue_purge(name, QueuePurgeOptions { nowait: false })
            .await?)
    }

    async fn delete_queue(
        &self,
        name: &str,
        options: QueueDeleteOptions,
    ) -> Result<(), anyhow::Error> {
        self.queue_delete(name, options).await?;
        Ok(())
    }

    #[tracing::instrument(name = "rabbitmq_close_channel", skip(self))]
    async fn close(&self) -> Result<(), anyhow::Error> {
        lapin::Channel::close(self, REPLY_SUCCESS, "OK").await?;
        Ok(())
    }
}

/// A [`lapin::Consumer`] adapted to the wait-then-drain cycle of the consume loop.
pub struct RabbitMqConsumer {
    tag: ConsumerTag,
    deliveries: BufferedStream<lapin::Consumer, lapin::message::Delivery>,
}

impl RabbitMqConsumer {
    fn new(inner: lapin::Consumer) -> Self {
        Self {
            tag: inner.tag().as_str().into(),
            deliveries: BufferedStream::new(inner),
        }
    }
}

#[async_trait::async_trait]
impl Consumer for RabbitMqConsumer {
    fn tag(&self) -> &ConsumerTag {
        &self.tag
    }

    async fn wait_for_activity(&mut self, timeout: WaitTimeout) -> Result<Readiness, WaitError> {
        self.deliveries.wait(timeout).await
    }

    async fn process_one_wait_cycle(&mut self) -> Result<Vec<WireDelivery>, anyhow::Error> {
        Ok(self
            .deliveries
            .drain()
            .into_iter()
            .map(WireDelivery::from)
            .collect())
    }
}

/// Buffers the items of a delivery stream between waits.
///
/// The item that ends a wait is kept until the next [`drain`](Self::drain).
/// A stream failure observed while draining is held back and reported by the next wait, so
/// that the items received before it are still processed.
struct BufferedStream<S, T> {
    stream: S,
    ready: VecDeque<T>,
    failure: Option<WaitError>,
}

impl<S, T, E> BufferedStream<S, T>
where
    S: Stream<Item = Result<T, E>> + Unpin,
    E: Into<WaitError>,
{
    fn new(stream: S) -> Self {
        Self {
            stream,
            ready: VecDeque::new(),
            failure: None,
        }
    }

    fn record(&mut self, event: Option<Result<T, E>>) {
        match event {
            Some(Ok(item)) => self.ready.push_back(item),
            Some(Err(e)) => self.failure = Some(e.into()),
            // The consumer was cancelled, or the channel went away.
            None => self.failure = Some(WaitError::without_detail()),
        }
    }

    async fn wait(&mut self, timeout: WaitTimeout) -> Result<Readiness, WaitError> {
        if !self.ready.is_empty() {
            return Ok(Readiness::Ready(self.ready.len()));
        }
        if let Some(failure) = self.failure.take() {
            return Err(failure);
        }

        let event = match timeout {
            WaitTimeout::Indefinite => self.stream.next().await,
            WaitTimeout::Bounded(timeout) => {
                match tokio::time::timeout(timeout, self.stream.next()).await {
                    Ok(event) => event,
                    Err(_) => return Ok(Readiness::Idle),
                }
            }
        };
        self.record(event);

        match self.failure.take() {
            Some(failure) => Err(failure),
            None => Ok(Readiness::Ready(self.ready.len())),
        }
    }

    /// Everything buffered, plus whatever the stream already yielded, without waiting for more.
    fn drain(&mut self) -> Vec<T> {
        while self.failure.is_none() {
            match self.stream.next().now_or_never() {
                Some(event) => self.record(event),
                None => break,
            }
        }
        self.ready.drain(..).collect()
    }
}

use super::{AmqpDriver, DriverError, ErrorKind};
use crate::codec::MessageCodec;
use crate::consumers::{ConsumeSession, DeliveryHandler};
use crate::transport::{
    Channel, ChannelOf, ConnectionProvider, Consumer, ConsumerTag, Readiness, WaitTimeout,
    WireDelivery,
};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, warn};

type ConsumerOf<P> = <ChannelOf<P> as Channel>::Consumer;

/// Why the consume loop returned without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// The stop flag was set.
    Stopped,
    /// The total timeout elapsed.
    TimedOut,
    /// The idle timeout elapsed with nothing to process.
    Idle,
    /// The wait for deliveries was interrupted by something harmless (e.g. a signal).
    Interrupted,
    /// The handler asked to stop.
    HandlerStopped,
}

impl<P, M> AmqpDriver<P, M>
where
    P: ConnectionProvider,
    M: MessageCodec,
{
    /// Consume messages from `queue`, handing each one to `handler`.
    ///
    /// `consume` returns `Ok(())` when:
    /// - `handler` returns `false`;
    /// - the driver is stopped (see [`StopHandle`](super::StopHandle));
    /// - `total_timeout` elapses;
    /// - no delivery arrives within `idle_timeout` (`Duration::ZERO` disables the idle cutoff);
    /// - waiting for deliveries is interrupted by something harmless, according to the
    ///   [`InterruptionPolicy`](super::InterruptionPolicy).
    ///
    /// Any other failure is reported as [`ErrorKind::ConsumeFailed`].
    ///
    /// On every exit path the consumer registration is cancelled and the channel is closed:
    /// deliveries that were not acked or rejected by then go back to the queue.
    /// Stop and timeouts are only checked between wait cycles: a running handler is never
    /// interrupted.
    #[tracing::instrument(name = "amqp_driver_consume", skip(self, handler))]
    pub async fn consume<H>(
        &mut self,
        queue: &str,
        handler: &mut H,
        idle_timeout: Duration,
        total_timeout: Option<Duration>,
    ) -> Result<(), DriverError>
    where
        H: DeliveryHandler<M::Message, ChannelOf<P>> + ?Sized,
    {
        let consume_failed = |cause: anyhow::Error| {
            DriverError::new(
                ErrorKind::ConsumeFailed,
                format!("Failed to consume from queue `{queue}`"),
                cause,
            )
        };

        if self.stop.is_stopped() {
            debug!("The driver has been stopped, not consuming");
            return Ok(());
        }

        let channel = self
            .channels
            .get_channel()
            .await
            .map_err(consume_failed)?
            .clone();
        let mut consumer = match channel
            .register_consumer(queue, &self.consumer_settings)
            .await
        {
            Ok(consumer) => consumer,
            Err(e) => {
                if let Err(close_error) = self.channels.close_channel().await {
                    warn!(error = ?close_error, "Failed to close the channel after a failed registration");
                }
                return Err(consume_failed(e));
            }
        };
        let tag = consumer.tag().clone();
        debug!(consumer_tag = %tag, "Registered consumer");

        self.stop.arm(channel.clone(), tag.clone());
        // A total timeout too large to be represented as an instant is no deadline at all.
        let deadline = total_timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let session = ConsumeSession {
            channel: &channel,
            queue,
            consumer_tag: &tag,
        };
        let outcome = self
            .run_loop(&session, &mut consumer, handler, idle_timeout, deadline)
            .await;
        self.stop.disarm();
        self.release_consumer(&channel, &tag).await;

        match outcome {
            Ok(exit) => {
                debug!(?exit, consumer_tag = %tag, "Left the consume loop");
                Ok(())
            }
            Err(e) => Err(consume_failed(e)),
        }
    }

    async fn run_loop<H>(
        &self,
        session: &ConsumeSession<'_, ChannelOf<P>>,
        consumer: &mut ConsumerOf<P>,
        handler: &mut H,
        idle_timeout: Duration,
        deadline: Option<Instant>,
    ) -> Result<LoopExit, anyhow::Error>
    where
        H: DeliveryHandler<M::Message, ChannelOf<P>> + ?Sized,
    {
        loop {
            if self.stop.is_stopped() {
                return Ok(LoopExit::Stopped);
            }
            let Some(timeout) = wait_budget(idle_timeout, deadline, Instant::now()) else {
                return Ok(LoopExit::TimedOut);
            };

            match consumer.wait_for_activity(timeout).await {
                // Stopping cancels the registration, which ends the wait with an error.
                Err(_) if self.stop.is_stopped() => return Ok(LoopExit::Stopped),
                Err(e) if self.interruption_policy.is_benign(&e) => {
                    warn!(error = %e, "Waiting for deliveries was interrupted");
                    return Ok(LoopExit::Interrupted);
                }
                Err(e) => {
                    error!(error = %e, "Waiting for deliveries failed");
                    return Err(e.into());
                }
                Ok(Readiness::Idle | Readiness::Ready(0)) => return Ok(LoopExit::Idle),
                Ok(Readiness::Ready(_)) => {
                    let deliveries = consumer.process_one_wait_cycle().await?;
                    if let Some(exit) = self.dispatch(session, handler, deliveries).await {
                        return Ok(exit);
                    }
                }
            }
        }
    }

    /// Hand one wait cycle's deliveries to `handler`, in order.
    ///
    /// Returns early if the handler asks to stop or the driver is stopped; the remaining
    /// deliveries are left unacknowledged and will be redelivered.
    async fn dispatch<H>(
        &self,
        session: &ConsumeSession<'_, ChannelOf<P>>,
        handler: &mut H,
        deliveries: Vec<WireDelivery>,
    ) -> Option<LoopExit>
    where
        H: DeliveryHandler<M::Message, ChannelOf<P>> + ?Sized,
    {
        for delivery in deliveries {
            if self.stop.is_stopped() {
                return Some(LoopExit::Stopped);
            }

            let delivery_tag = delivery.delivery_tag;
            match self.codec.decode(delivery, session.queue()) {
                Ok(delivery) => {
                    if !handler.handle(session, delivery).await {
                        return Some(LoopExit::HandlerStopped);
                    }
                }
                Err(e) => {
                    // Requeueing a message we cannot read would only get it back straight away.
                    warn!(error = ?e, delivery_tag, "Failed to decode a delivery, rejecting it");
                    if let Err(e) = session.channel.reject(delivery_tag, false).await {
                        warn!(error = ?e, delivery_tag, "Failed to reject an undecodable delivery");
                    }
                }
            }
        }
        None
    }

    /// Cancel the registration and close the channel.
    ///
    /// Best-effort: failures are logged, the channel is discarded either way.
    async fn release_consumer(&mut self, channel: &ChannelOf<P>, tag: &ConsumerTag) {
        if let Err(e) = channel.cancel_consumer(tag, false).await {
            warn!(error = ?e, consumer_tag = %tag, "Failed to cancel the consumer");
        }
        if let Err(e) = self.channels.close_channel().await {
            warn!(error = ?e, "Failed to close the channel");
        }
    }
}

/// How long the next wait may last, or `None` if the total timeout has been reached.
///
/// A zero `idle_timeout` means "no idle cutoff", which is an indefinite wait unless a
/// `deadline` bounds it.
fn wait_budget(
    idle_timeout: Duration,
    deadline: Option<Instant>,
    now: Instant,
) -> Option<WaitTimeout> {
    let idle = (!idle_timeout.is_zero()).then_some(idle_timeout);
    match deadline {
        None => Some(idle.map_or(WaitTimeout::Indefinite, WaitTimeout::Bounded)),
        Some(deadline) => {
            let remaining = deadline
                .checked_duration_since(now)
                .filter(|remaining| !remaining.is_zero())?;
            Some(WaitTimeout::Bounded(
                idle.map_or(remaining, |idle| idle.min(remaining)),
            ))
        }
    }
}

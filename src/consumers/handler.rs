//! The `DeliveryHandler` trait, and an adapter to use plain closures as handlers.
use crate::consumers::{ConsumeSession, MessageDelivery};
use crate::transport::Channel;

/// Implementers of the `DeliveryHandler` trait process the messages received by
/// [`AmqpDriver::consume`](crate::driver::AmqpDriver::consume).
///
/// # Flow control
///
/// The returned boolean tells the consume loop whether to keep going: `true` to wait for the
/// next message, `false` to stop once this message has been handled.
///
/// # Scope
///
/// `handle` runs inline in the consume loop: while it runs no other message is processed and
/// neither the stop signal nor the timeouts are looked at.
/// Long-running work should be handed off elsewhere.
///
/// Messages are not acknowledged automatically: use the [`ConsumeSession`] to ack or reject
/// each delivery before returning.
#[async_trait::async_trait]
pub trait DeliveryHandler<M, C>: Send
where
    M: Send + 'static,
    C: Channel,
{
    async fn handle(
        &mut self,
        session: &ConsumeSession<'_, C>,
        delivery: MessageDelivery<M>,
    ) -> bool;
}

/// Implement the [`DeliveryHandler`] trait for all boxed handlers.
///
/// E.g. `Box<dyn DeliveryHandler<M, C>>`.
#[async_trait::async_trait]
impl<M, C, H> DeliveryHandler<M, C> for Box<H>
where
    M: Send + 'static,
    C: Channel,
    H: DeliveryHandler<M, C> + ?Sized,
{
    async fn handle(
        &mut self,
        session: &ConsumeSession<'_, C>,
        delivery: MessageDelivery<M>,
    ) -> bool {
        H::handle(self, session, delivery).await
    }
}

/// Wrapper type to turn a synchronous closure into a [`DeliveryHandler`].
///
/// The closure does not get access to the [`ConsumeSession`]: it suits consumers that ack
/// elsewhere, or not at all (deliveries are then redelivered once the channel is closed).
pub struct ClosureHandler<F>(pub F);

#[async_trait::async_trait]
impl<M, C, F> DeliveryHandler<M, C> for ClosureHandler<F>
where
    M: Send + 'static,
    C: Channel,
    F: FnMut(MessageDelivery<M>) -> bool + Send,
{
    async fn handle(
        &mut self,
        _session: &ConsumeSession<'_, C>,
        delivery: MessageDelivery<M>,
    ) -> bool {
        (self.0)(delivery)
    }
}

use crate::consumers::MessageDelivery;
use crate::driver::{acknowledge, reject, DriverError};
use crate::transport::{Channel, ConsumerTag};
use std::future::Future;

/// The consume session a delivery belongs to.
///
/// It gives handlers access to the channel the delivery came from, which is the only channel
/// its delivery tag is valid on.
pub struct ConsumeSession<'a, C> {
    pub(crate) channel: &'a C,
    pub(crate) queue: &'a str,
    pub(crate) consumer_tag: &'a ConsumerTag,
}

impl<'a, C: Channel> ConsumeSession<'a, C> {
    /// The queue being consumed.
    pub fn queue(&self) -> &str {
        self.queue
    }

    /// The tag of the consumer registration for this session.
    pub fn consumer_tag(&self) -> &ConsumerTag {
        self.consumer_tag
    }

    /// Acknowledge `delivery`.
    pub fn ack<M>(
        &self,
        delivery: &MessageDelivery<M>,
    ) -> impl Future<Output = Result<(), DriverError>> + Send + 'a {
        acknowledge(self.channel, delivery.delivery_tag)
    }

    /// Reject `delivery`, asking the broker to requeue it.
    pub fn reject<M>(
        &self,
        delivery: &MessageDelivery<M>,
    ) -> impl Future<Output = Result<(), DriverError>> + Send + 'a {
        reject(self.channel, delivery.delivery_tag)
    }
}

use amq_protocol_types::DeliveryTag;
use lapin::BasicProperties;

/// A decoded message, together with what is needed to acknowledge it.
///
/// `MessageDelivery` is the input type of [`DeliveryHandler`](crate::consumers::DeliveryHandler)s.
/// Its lifetime ends when it is acked or rejected; if neither happens before the channel
/// it came from is closed, the broker will deliver the message again.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageDelivery<M> {
    /// The decoded message.
    pub message: M,

    /// The broker-assigned tag used to ack/reject this delivery.
    ///
    /// Only meaningful on the channel the message was consumed from.
    pub delivery_tag: DeliveryTag,

    /// The queue the message was consumed from.
    pub queue: String,

    /// Whether this message was redelivered
    pub redelivered: bool,

    /// Contains the properties and the headers of the
    /// message.
    pub properties: BasicProperties,
}

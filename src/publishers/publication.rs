/// A message to be published via [`AmqpDriver::publish`](crate::driver::AmqpDriver::publish),
/// with its delivery flags.
///
/// Where the message goes (exchange and routing key) is passed alongside it at publishing time.
#[derive(Debug, Clone, PartialEq)]
pub struct MessagePublication<M> {
    // The domain message. It is encoded by the driver's codec before publishing.
    pub message: M,
    // The message survives a broker restart if it is routed to a durable queue.
    pub persistent: bool,
    // The broker returns the message if it cannot be routed to any queue.
    pub mandatory: bool,
    // The broker returns the message if it cannot be delivered to a consumer straight away.
    // RabbitMQ does not support it: publishing with `immediate` closes the channel.
    pub immediate: bool,
}

impl<M> MessagePublication<M> {
    /// A persistent message, neither mandatory nor immediate.
    pub fn persistent(message: M) -> Self {
        Self {
            message,
            persistent: true,
            mandatory: false,
            immediate: false,
        }
    }

    /// A message the broker may drop on restart.
    pub fn transient(message: M) -> Self {
        Self {
            persistent: false,
            ..Self::persistent(message)
        }
    }

    #[must_use]
    pub fn with_mandatory(mut self, value: bool) -> Self {
        self.mandatory = value;
        self
    }

    #[must_use]
    pub fn with_immediate(mut self, value: bool) -> Self {
        self.immediate = value;
        self
    }
}

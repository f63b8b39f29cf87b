//! `carrot-cake-driver` is an AMQP 0-9-1 transport driver, built on top of [`lapin`].
//!
//! It adapts the operations an event bus needs (publish, consume, ack/reject, topology
//! management) onto a single, lazily opened channel, and gives consumers a timed,
//! stoppable consume loop.
//!
//! [`AmqpDriver`](crate::driver::AmqpDriver) is the best starting point.
//! The driver reaches the broker through the capabilities in [`transport`]: the `lapin`
//! implementation is provided, either straight from a
//! [`ConnectionFactory`](crate::amqp::ConnectionFactory) or from a
//! [`ConnectionPool`](crate::pool::ConnectionPool).

pub mod codec;
pub mod consumers;
pub mod driver;
pub mod publishers;
pub mod topology;
pub mod transport;

pub mod amqp;
pub mod pool;

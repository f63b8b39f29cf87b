//! Helpers for connecting to a RabbitMq broker, plus re-exports of the AMQP protocol types
//! exposed by the public API of this crate.

pub mod configuration;
pub mod convenience;
mod factory;
pub use factory::ConnectionFactory;

pub use lapin::{options, types, BasicProperties, ExchangeKind};

//! Connection pooling for [`lapin::Connection`] using [`deadpool`].
//!
//! A [`ConnectionPool`] is a [`ConnectionProvider`](crate::transport::ConnectionProvider):
//! drivers built on top of the same pool share a bounded set of connections, each driver
//! holding on to the connection it got for as long as it lives.
//! Broken connections are discarded by the pool and replaced on demand.
//!
//! ```rust,no_run
//! use carrot_cake_driver::amqp::configuration::RabbitMqSettings;
//! use carrot_cake_driver::amqp::ConnectionFactory;
//! use carrot_cake_driver::codec::JsonCodec;
//! use carrot_cake_driver::driver::AmqpDriver;
//! use carrot_cake_driver::pool::ConnectionPool;
//!
//! async fn example() -> anyhow::Result<()> {
//!     let settings = RabbitMqSettings::default();
//!     let pool = ConnectionPool::builder(ConnectionFactory::new_from_config(&settings)?)
//!         .max_size(4)
//!         .build()?;
//!
//!     // Pools are cheap to clone: every clone hands out connections from the same set.
//!     let publisher = AmqpDriver::new(pool.clone(), JsonCodec::<serde_json::Value>::new("order"));
//!     let consumer = AmqpDriver::new(pool, JsonCodec::<serde_json::Value>::new("order"));
//!     Ok(())
//! }
//! ```
mod connection;
mod error;

pub use connection::{ConnectionPool, PooledConnection};
pub use error::Error;

//! Implements [`Manager`] for [`ConnectionFactory`], and the transport capabilities for the pool.
use crate::amqp::ConnectionFactory;
use crate::transport::{Connection, ConnectionProvider};
use deadpool::managed::{self, Manager};
use lapin::ConnectionState;

/// `ConnectionPool` is a pool of [`lapin::Connection`]s.
pub type ConnectionPool = managed::Pool<ConnectionFactory>;

/// A connection borrowed from a [`ConnectionPool`]; it goes back to the pool when dropped.
pub type PooledConnection = managed::Object<ConnectionFactory>;

#[async_trait::async_trait]
impl Manager for ConnectionFactory {
    type Type = lapin::Connection;
    type Error = super::Error;

    async fn create(&self) -> Result<lapin::Connection, super::Error> {
        Ok(self.new_connection().await?)
    }

    async fn recycle(&self, obj: &mut lapin::Connection) -> managed::RecycleResult<super::Error> {
        match obj.status().state() {
            ConnectionState::Connected => Ok(()),
            state => Err(managed::RecycleError::Message(format!(
                "Connection is not in an healthy state {state:?}",
            ))),
        }
    }
}

#[async_trait::async_trait]
impl ConnectionProvider for ConnectionPool {
    type Connection = PooledConnection;

    #[tracing::instrument(name = "rabbitmq_pool_get", skip(self))]
    async fn get_connection(&self) -> Result<PooledConnection, anyhow::Error> {
        let connection = self.get().await.map_err(super::Error::from)?;
        Ok(connection)
    }
}

#[async_trait::async_trait]
impl Connection for PooledConnection {
    type Channel = lapin::Channel;

    async fn open_channel(&self) -> Result<lapin::Channel, anyhow::Error> {
        Ok(self.create_channel().await?)
    }
}

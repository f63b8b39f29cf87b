use crate::transport::{Channel, ChannelOf, Connection, ConnectionProvider};
use anyhow::Context;
use tracing::debug;

/// Lazily opens the driver's single channel and keeps it until it is closed.
///
/// The connection is requested from the provider once, the first time a channel is needed,
/// and then kept for the lifetime of the manager.
pub(crate) struct ChannelManager<P: ConnectionProvider> {
    provider: P,
    connection: Option<P::Connection>,
    channel: Option<ChannelOf<P>>,
}

impl<P: ConnectionProvider> ChannelManager<P> {
    pub(crate) fn new(provider: P) -> Self {
        Self {
            provider,
            connection: None,
            channel: None,
        }
    }

    /// The current channel, opening a new one if there is none or if the broker closed it.
    pub(crate) async fn get_channel(&mut self) -> Result<&ChannelOf<P>, anyhow::Error> {
        let channel = match self.channel.take() {
            Some(channel) if channel.is_open() => channel,
            Some(_) => {
                debug!("The cached channel was closed by the broker, opening a new one");
                self.open_channel().await?
            }
            None => self.open_channel().await?,
        };
        Ok(self.channel.insert(channel))
    }

    /// Close the current channel, if any.
    ///
    /// The channel is forgotten even if closing it fails: the next
    /// [`get_channel`](Self::get_channel) opens a fresh one.
    pub(crate) async fn close_channel(&mut self) -> Result<(), anyhow::Error> {
        match self.channel.take() {
            Some(channel) => {
                debug!("Closing the channel");
                channel.close().await
            }
            None => Ok(()),
        }
    }

    async fn open_channel(&mut self) -> Result<ChannelOf<P>, anyhow::Error> {
        let connection = match self.connection.take() {
            Some(connection) => connection,
            None => self
                .provider
                .get_connection()
                .await
                .context("Failed to acquire a connection to the broker")?,
        };
        let connection = self.connection.insert(connection);
        let channel = connection
            .open_channel()
            .await
            .context("Failed to open a channel")?;
        debug!("Opened a new channel");
        Ok(channel)
    }
}

use crate::amqp::configuration::{RabbitMqSettings, RabbitMqTlsSettings};
use anyhow::Context;
use lapin::{
    tcp::{AMQPUriTcpExt, NativeTlsConnector},
    uri::{AMQPScheme, AMQPUri},
    ConnectionProperties,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens connections to a RabbitMq broker.
///
/// `ConnectionFactory` is the simplest [`ConnectionProvider`](crate::transport::ConnectionProvider):
/// every call establishes a brand new connection, which the driver then keeps for its whole
/// lifetime. Wrap it in a [`ConnectionPool`](crate::pool::ConnectionPool) to share connections
/// between drivers.
#[derive(Clone)]
pub struct ConnectionFactory {
    uri: AMQPUri,
    connection_timeout: Duration,
    /// `None` for plain-text connections.
    tls: Option<Arc<Tls>>,
}

struct Tls {
    connector: NativeTlsConnector,
    /// The name expected on the server certificate.
    domain: String,
}

impl Tls {
    fn from_settings(settings: &RabbitMqTlsSettings, host: String) -> Result<Self, anyhow::Error> {
        let mut builder = NativeTlsConnector::builder();
        if let Some(certificate) = settings.ca_certificate_chain()? {
            builder.add_root_certificate(certificate);
        }
        let connector = builder
            .build()
            .context("Failed to build the TLS connector for RabbitMQ.")?;
        Ok(Self {
            connector,
            domain: settings.domain.clone().unwrap_or(host),
        })
    }
}

impl ConnectionFactory {
    /// Fails if the TLS settings are invalid.
    ///
    /// Connection attempts time out after 10 seconds unless `settings` says otherwise.
    pub fn new_from_config(settings: &RabbitMqSettings) -> Result<Self, anyhow::Error> {
        let uri = settings.amqp_uri();
        let tls = match &settings.tls {
            Some(tls) => Some(Arc::new(Tls::from_settings(
                tls,
                uri.authority.host.clone(),
            )?)),
            None => None,
        };
        Ok(Self {
            uri,
            connection_timeout: settings
                .connection_timeout()
                .unwrap_or(DEFAULT_CONNECTION_TIMEOUT),
            tls,
        })
    }

    /// Open a new connection, encrypted if TLS is configured.
    ///
    /// Broker-side errors on the connection are logged for as long as it stays open.
    #[tracing::instrument(name = "rabbitmq_connect", skip(self), fields(host = %self.uri.authority.host))]
    pub async fn new_connection(&self) -> Result<lapin::Connection, anyhow::Error> {
        let properties =
            ConnectionProperties::default().with_executor(tokio_executor_trait::Tokio::current());
        let attempt = async {
            match &self.tls {
                None => lapin::Connection::connect_uri(self.uri.clone(), properties).await,
                Some(tls) => self.connect_with_tls(properties, Arc::clone(tls)).await,
            }
        };
        let connection = tokio::time::timeout(self.connection_timeout, attempt)
            .await
            .map_err(|_| anyhow::anyhow!("Timed out while trying to connect to RabbitMQ."))?
            .context("Failed to connect to RabbitMQ.")?;
        connection.on_error(|e| {
            warn!(error = ?e, "RabbitMQ connection broken");
        });
        Ok(connection)
    }

    async fn connect_with_tls(
        &self,
        properties: ConnectionProperties,
        tls: Arc<Tls>,
    ) -> Result<lapin::Connection, lapin::Error> {
        lapin::Connection::connector(
            self.uri.clone(),
            Box::new(move |uri| {
                // Plain TCP first, then the TLS handshake against the configured domain.
                let mut plain = uri.clone();
                plain.scheme = AMQPScheme::AMQP;
                plain
                    .connect()
                    .and_then(|tcp| tcp.into_native_tls(&tls.connector, &tls.domain))
            }),
            properties,
        )
        .await
    }
}

/// The operation a [`DriverError`] originates from.
///
/// Callers get the same small set of kinds no matter which underlying protocol call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    PublishFailed,
    ConsumeFailed,
    AckFailed,
    RejectFailed,
    ExchangeDeclareFailed,
    ExchangeBindFailed,
    ExchangeUnbindFailed,
    ExchangeDeleteFailed,
    QueueDeclareFailed,
    QueueBindFailed,
    QueueUnbindFailed,
    QueuePurgeFailed,
    QueueDeleteFailed,
    CloseFailed,
}

/// Error returned by every [`AmqpDriver`](super::AmqpDriver) operation.
///
/// It wraps exactly one underlying failure, available via [`DriverError::cause`] and
/// [`std::error::Error::source`].
/// The driver never retries: that is up to the caller.
#[derive(thiserror::Error, Debug)]
#[error("{message}")]
pub struct DriverError {
    kind: ErrorKind,
    message: String,
    #[source]
    cause: anyhow::Error,
}

impl DriverError {
    pub(crate) fn new(kind: ErrorKind, message: impl Into<String>, cause: anyhow::Error) -> Self {
        Self {
            kind,
            message: message.into(),
            cause,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The failure reported by the transport.
    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}

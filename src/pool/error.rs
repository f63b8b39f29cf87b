use deadpool::managed::PoolError;

/// Failure to hand out a pooled connection.
#[derive(thiserror::Error, Debug)]
#[error(transparent)]
pub struct Error(#[from] anyhow::Error);

impl From<lapin::Error> for Error {
    fn from(err: lapin::Error) -> Self {
        Self(err.into())
    }
}

impl From<PoolError<Error>> for Error {
    fn from(err: PoolError<Error>) -> Self {
        match err {
            // Connecting failed: surface the connection error itself.
            PoolError::Backend(e) => e,
            err => Self(anyhow::anyhow!("Failed to get a connection from the pool: {err}")),
        }
    }
}

use crate::pool::Connection;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TtlPoolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to dial {address}: {source}")]
    Dial {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Connection pool is closed")]
    PoolClosed,

    #[error("Connection {id} does not belong to this pool")]
    ForeignConnection { id: usize },
}

impl TtlPoolError {
    pub(crate) fn dial(address: &str, source: std::io::Error) -> Self {
        TtlPoolError::Dial {
            address: address.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, TtlPoolError>;

/// A rejected `release`, carrying the connection back to the caller.
///
/// Nothing is dropped on rejection: hand `connection` to the pool that
/// dialed it. Converting into [`TtlPoolError`] with `?` drops the
/// connection, and the owning pool loses that slot.
#[derive(Debug)]
pub struct ReleaseError<S> {
    pub error: TtlPoolError,
    pub connection: Connection<S>,
}

impl<S> ReleaseError<S> {
    pub fn into_connection(self) -> Connection<S> {
        self.connection
    }
}

impl<S> fmt::Display for ReleaseError<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.error, f)
    }
}

impl<S: fmt::Debug> std::error::Error for ReleaseError<S> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&self.error)
    }
}

impl<S> From<ReleaseError<S>> for TtlPoolError {
    fn from(rejected: ReleaseError<S>) -> Self {
        rejected.error
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while resolving, fetching, or decoding alignment data.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed index, block, or record bytes. Fatal for this file; a
    /// different source is needed.
    #[error("format error: {0}")]
    Format(String),

    /// Transport failure reported by a byte-range source. Retryable by
    /// reissuing the range request.
    #[error("network error: {0}")]
    Network(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Two-way retryability classification carried on error notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Corrupt bytes; retrying the same source cannot help.
    Format,
    /// Fetch failure; the same range may succeed later.
    Network,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Format(_) => ErrorKind::Format,
            // Io failures come out of a fetch capability, so they classify
            // like network failures: the range stays retryable.
            Error::Network(_) | Error::Io(_) => ErrorKind::Network,
        }
    }
}

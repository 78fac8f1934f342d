//! Client-layer error taxonomy (spec §4.10, §7 "Transient backend").

use thiserror::Error;

pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("no backend hosts configured for role {0:?}")]
    NoHosts(crate::pool::Role),

    #[error("invalid backend URL {0:?}: {1}")]
    InvalidUrl(String, String),

    #[error("failed to build transport: {0}")]
    Transport(String),

    #[error("could not connect to backend ({role:?}) after {attempts} attempts")]
    ConnectFailed { role: crate::pool::Role, attempts: u32 },

    #[error("failed to start async runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

impl ClientError {
    #[must_use]
    pub const fn error_type(&self) -> &'static str {
        match self {
            Self::NoHosts(_) => "NO_HOSTS",
            Self::InvalidUrl(..) => "INVALID_URL",
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::ConnectFailed { .. } => "CONNECT_FAILED",
            Self::Runtime(_) => "RUNTIME_ERROR",
        }
    }

    /// Connection establishment failures are plausibly transient (backend
    /// still starting up); configuration failures are not.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectFailed { .. })
    }
}

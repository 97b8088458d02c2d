use thiserror::Error;

/// Failure taxonomy shared by every component. Operations return these
/// instead of throwing past their boundary; resolution and aggregation
/// never fail at all and degrade to placeholders instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Rejected locally before any network call.
    #[error("{0}")]
    Validation(String),
    /// The server refused the write (e.g. attendance already recorded for
    /// the session, or a duplicate entity code). Message is the server's.
    #[error("{0}")]
    Conflict(String),
    /// A referenced session/class/student no longer exists.
    #[error("{0}")]
    NotFound(String),
    /// Network unreachable or a non-2xx response without a structured body.
    /// User-retryable; never retried automatically.
    #[error("could not reach server: {0}")]
    Transport(String),
    /// 401 after the one permitted token refresh attempt.
    #[error("session expired, sign in again")]
    AuthExpired,
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Only transport failures are worth offering a retry for; the rest
    /// need the user to change something first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

/// Typed failures surfaced by every service operation.
///
/// The embedding layer translates these into transport status codes; the
/// core never returns a partial result alongside one of these.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or missing input; the message names the offending field.
    #[error("{0}")]
    Validation(String),

    /// The referenced entity does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Uniqueness violation.
    #[error("{0}")]
    Conflict(String),

    /// Failed credential or token check.
    #[error("unauthorized")]
    Unauthorized,

    /// Token signature is fine but the expiry claim is in the past.
    /// Kept distinct from [`Error::TokenInvalid`] for UX messaging.
    #[error("token expired")]
    TokenExpired,

    /// Bad signature or malformed token.
    #[error("token invalid")]
    TokenInvalid,

    /// Storage, notification or other infrastructure failure.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Internal(e.into())
    }
}

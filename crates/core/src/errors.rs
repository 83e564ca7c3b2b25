use thiserror::Error;

/// Failures from the quote generator provider. Messages are constructed
/// from status codes and provider descriptions only; they must never
/// carry credential material, since they end up in log output verbatim.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GenerateError {
    #[error("generator rejected credentials: {0}")]
    Auth(String),
    #[error("generator unavailable: {0}")]
    Unavailable(String),
    #[error("generator returned no usable text")]
    Empty,
}

/// Failures from the delivery provider. Same logging constraint as
/// [`GenerateError`]: no credential material in messages.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeliverError {
    #[error("delivery rejected credentials: {0}")]
    Auth(String),
    #[error("delivery target rejected: {0}")]
    TargetInvalid(String),
    #[error("delivery unavailable: {0}")]
    Unavailable(String),
}

use std::time::Duration;
use thiserror::Error;

/// Errors produced by exchange adapters.
///
/// Transient kinds are safe to retry; permanent kinds must surface
/// immediately to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExchangeError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("rate limited by exchange")]
    RateLimited,

    #[error("connection reset: {0}")]
    ConnectionReset(String),

    #[error("invalid order: {0}")]
    InvalidOrder(String),

    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("exchange api error: {0}")]
    Api(String),

    #[error("failed to parse exchange response: {0}")]
    Parse(String),
}

impl ExchangeError {
    /// Whether the retry policy may re-attempt a call that failed this way
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::Timeout(_)
                | ExchangeError::RateLimited
                | ExchangeError::ConnectionReset(_)
        )
    }
}

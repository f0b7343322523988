use thiserror::Error;

/// Failure of a venue call
///
/// Adapters decide which variant a failure maps to; the core only cares
/// whether it is worth retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VenueError {
    #[error("Venue call timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Order rejected: {0}")]
    Rejected(String),

    #[error("Order not found: {0}")]
    NotFound(String),

    #[error("No liquidity for {0}")]
    NoLiquidity(String),

    #[error("Venue unavailable: {0}")]
    Unavailable(String),

    #[error("Fatal venue error: {0}")]
    Fatal(String),
}

impl VenueError {
    /// Whether the same call may succeed if tried again later
    pub fn is_retryable(&self) -> bool {
        !matches!(self, VenueError::Fatal(_) | VenueError::Rejected(_))
    }
}

pub type VenueResult<T> = std::result::Result<T, VenueError>;

/// Persistence failure (surfaced, never rolls back in-memory state)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Write failed: {0}")]
    Write(String),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

use thiserror::Error;

/// Failure raised by a strategy callback or while building one
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StrategyError {
    #[error("strategy failed: {0}")]
    Failed(String),

    #[error("order rejected: {0}")]
    Order(String),

    #[error("strategy panicked: {0}")]
    Panicked(String),

    #[error("unknown strategy kind: {0}")]
    UnknownKind(String),

    #[error("invalid parameters for strategy {name}: {reason}")]
    InvalidParams { name: String, reason: String },
}

pub type Result<T> = std::result::Result<T, StrategyError>;

use hedge_gateway::RegistryError;
use hedge_strategy::StrategyError;
use thiserror::Error;

/// Configuration errors, fatal at startup only
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {error}")]
    Io { path: String, error: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("unknown venue kind '{kind}' for venue {venue}")]
    UnknownVenueKind { venue: String, kind: String },

    #[error("unknown strategy kind '{kind}' for strategy {strategy}")]
    UnknownStrategyKind { strategy: String, kind: String },

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Order(#[from] hedge_order_manager::Error),

    #[error(transparent)]
    Strategy(#[from] StrategyError),

    #[error("strategy {0} is already running")]
    DuplicateStrategy(String),

    #[error("engine already started")]
    AlreadyStarted,
}

pub type Result<T> = std::result::Result<T, EngineError>;

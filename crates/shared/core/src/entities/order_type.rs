use serde::{Deserialize, Serialize};

/// Order types sent to venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Execute immediately against the book (IOC semantics)
    Market,
    /// Rest at a specified price
    Limit,
}

impl OrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Market => "market",
            Self::Limit => "limit",
        }
    }
}

/// How a plan order's residual is worked at venues
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStyle {
    /// Take liquidity with market orders
    #[default]
    Market,
    /// Post one tick inside the spread, escalate to market on expiry
    Limit,
}

//! Order Manager errors

use hedge_core::{DomainError, PlanOrderId, Side};
use hedge_ports::{StoreError, VenueError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown instrument: {0}")]
    UnknownInstrument(String),

    #[error("Invalid plan order: {0}")]
    InvalidPlanOrder(#[from] DomainError),

    #[error("Unknown plan order: {0}")]
    UnknownPlan(PlanOrderId),

    #[error("No venue available for {side} {instrument}")]
    NoVenueAvailable { instrument: String, side: Side },

    #[error("Venue error: {0}")]
    Venue(#[from] VenueError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, Error>;

//! Error types for the gateway crate

use hedge_ports::VenueError;
use thiserror::Error;

/// Transport-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Channel closed")]
    ChannelClosed,
}

/// Venue registry and factory errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Unknown venue: {0}")]
    UnknownVenue(String),

    #[error("Venue already registered: {0}")]
    DuplicateVenue(String),

    #[error("Venue {venue} is still referenced by enabled instruments: {instruments:?}")]
    VenueInUse {
        venue: String,
        instruments: Vec<String>,
    },

    #[error("No binding for instrument {instrument} on venue {venue}")]
    UnknownBinding { instrument: String, venue: String },

    #[error("Invalid binding of {instrument} on {venue}: {reason}")]
    InvalidBinding {
        instrument: String,
        venue: String,
        reason: String,
    },

    #[error("Unknown venue kind: {0}")]
    UnknownVenueKind(String),

    #[error("Invalid venue settings for {venue}: {reason}")]
    InvalidSettings { venue: String, reason: String },

    #[error("Venue error: {0}")]
    Venue(#[from] VenueError),
}

pub type Result<T> = std::result::Result<T, RegistryError>;

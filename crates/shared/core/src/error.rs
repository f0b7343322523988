use rust_decimal::Decimal;
use thiserror::Error;

/// Domain validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Quantity must be positive, got {0}")]
    NonPositiveQuantity(Decimal),

    #[error("Price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("Instrument name must not be empty")]
    EmptyInstrument,

    #[error("Precision {0} exceeds the 28 decimal places a price can carry")]
    PrecisionTooLarge(u32),

    #[error("Depth window must be positive, got {0}")]
    NonPositiveDepthWindow(Decimal),
}

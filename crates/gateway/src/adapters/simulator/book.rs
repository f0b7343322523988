use hedge_core::{Notional, Price, Quantity, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Decimal places kept on a depth-weighted price
const VWAP_SCALE: u32 = 12;

/// Static two-sided price ladder for one symbol
///
/// Levels are `(price, size)` in base units. Bids are kept best-first
/// (descending), asks best-first (ascending).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimBook {
    #[serde(default)]
    pub bids: Vec<(Price, Quantity)>,
    #[serde(default)]
    pub asks: Vec<(Price, Quantity)>,
}

impl SimBook {
    pub fn new(bids: Vec<(Price, Quantity)>, asks: Vec<(Price, Quantity)>) -> Self {
        let mut book = Self { bids, asks };
        book.normalize();
        book
    }

    /// Sort both ladders best-first and drop empty levels
    pub fn normalize(&mut self) {
        self.bids.retain(|(p, s)| *p > Decimal::ZERO && *s > Decimal::ZERO);
        self.asks.retain(|(p, s)| *p > Decimal::ZERO && *s > Decimal::ZERO);
        self.bids.sort_by(|a, b| b.0.cmp(&a.0));
        self.asks.sort_by(|a, b| a.0.cmp(&b.0));
    }

    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|(p, _)| *p)
    }

    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|(p, _)| *p)
    }

    /// Levels a `side` order executes against
    fn levels(&self, side: Side) -> &[(Price, Quantity)] {
        match side {
            Side::Buy => &self.asks,
            Side::Sell => &self.bids,
        }
    }

    /// Volume-weighted price to execute `window` notional on `side`
    ///
    /// A zero window yields the touch. A window deeper than the ladder
    /// averages over the whole ladder. `None` when the side is empty.
    pub fn depth_price(&self, side: Side, window: Notional) -> Option<Price> {
        let levels = self.levels(side);
        let (touch, _) = levels.first()?;
        if window <= Decimal::ZERO {
            return Some(*touch);
        }

        let mut remaining = window;
        let mut cost = Decimal::ZERO;
        let mut size = Decimal::ZERO;
        let mut touched = 0usize;
        for (price, level_size) in levels {
            touched += 1;
            let level_notional = *price * *level_size;
            if level_notional < remaining {
                cost += level_notional;
                size += *level_size;
                remaining -= level_notional;
                continue;
            }
            // Only the last, partial level needs a division
            cost += remaining;
            size += remaining / *price;
            break;
        }

        if touched == 1 {
            return Some(*touch);
        }
        if size.is_zero() {
            return None;
        }
        Some((cost / size).round_dp(VWAP_SCALE).normalize())
    }
}

//! Venue selection
//!
//! Quotes every routable binding for the depth window it would be sent,
//! scores each quote by its fee-adjusted price and ranks them. Scoring is
//! pure so the ranking is deterministic given the quotes.

use hedge_core::{Price, Side, SymbolInfo};
use hedge_gateway::{Candidate, VenueConnection, VenueRegistry};
use log::{debug, warn};
use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

/// Which fee schedule applies to the order being routed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeeKind {
    /// Market orders take liquidity
    Taker,
    /// Resting limit orders make liquidity
    Maker,
}

/// A scored depth quote from one venue
#[derive(Debug, Clone)]
pub struct Quote {
    pub venue: Arc<VenueConnection>,
    pub info: SymbolInfo,
    /// Binding registration sequence
    pub seq: u64,
    /// VWAP over the binding's depth window
    pub price: Price,
    /// Fee-adjusted price used for ranking
    pub score: Decimal,
}

impl Quote {
    pub fn venue_name(&self) -> &str {
        &self.info.venue
    }
}

/// Effective price of executing at `price` after paying `rate`
///
/// A buyer pays the fee on top; a seller receives less.
pub fn score(side: Side, price: Price, rate: Decimal) -> Decimal {
    match side {
        Side::Buy => price * (Decimal::ONE + rate),
        Side::Sell => price * (Decimal::ONE - rate),
    }
}

/// Order quotes best-first
///
/// Buys prefer the lowest score, sells the highest. Equal scores keep the
/// binding registration order.
pub fn rank_quotes(side: Side, mut quotes: Vec<Quote>) -> Vec<Quote> {
    quotes.sort_by(|a, b| compare(side, a.score, b.score).then(a.seq.cmp(&b.seq)));
    quotes
}

fn compare(side: Side, a: Decimal, b: Decimal) -> Ordering {
    match side {
        Side::Buy => a.cmp(&b),
        Side::Sell => b.cmp(&a),
    }
}

pub struct VenueSelector {
    registry: Arc<VenueRegistry>,
}

impl VenueSelector {
    pub fn new(registry: Arc<VenueRegistry>) -> Self {
        Self { registry }
    }

    pub fn candidates(&self, instrument: &str, side: Side) -> Vec<Candidate> {
        self.registry.candidates(instrument, side)
    }

    /// Quote and rank `candidates`
    ///
    /// Candidates that fail to quote are skipped.
    pub async fn quote(&self, candidates: Vec<Candidate>, side: Side, fee: FeeKind) -> Vec<Quote> {
        let mut quotes = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let Candidate { seq, info, venue } = candidate;
            match venue
                .get_depth_price(&info.symbol, side, info.depth_window)
                .await
            {
                Ok(price) => {
                    let rate = match fee {
                        FeeKind::Taker => venue.taker_rate(),
                        FeeKind::Maker => venue.maker_rate(),
                    };
                    let score = score(side, price, rate);
                    debug!(
                        "[ROUTE] {} {} {} depth {} score {}",
                        info.venue, side, info.symbol, price, score
                    );
                    quotes.push(Quote {
                        venue,
                        info,
                        seq,
                        price,
                        score,
                    });
                }
                Err(e) => warn!("[ROUTE] {} failed to quote {}: {}", info.venue, info.symbol, e),
            }
        }
        rank_quotes(side, quotes)
    }

    /// Fresh ranking for `instrument`, leaving out `excluded` venues
    pub async fn requote(
        &self,
        instrument: &str,
        side: Side,
        fee: FeeKind,
        excluded: &HashSet<String>,
    ) -> Vec<Quote> {
        let candidates: Vec<Candidate> = self
            .candidates(instrument, side)
            .into_iter()
            .filter(|c| !excluded.contains(&c.info.venue))
            .collect();
        if candidates.is_empty() {
            return Vec::new();
        }
        self.quote(candidates, side, fee).await
    }
}

//! Core type definitions shared across the trading engine.
//!
//! Prices are integer cents on the canonical [0, 1] contract scale: a binary
//! contract trading at $0.42 is `42`. Venue-native units (decimal strings,
//! sub-cent ticks) are converted at the adapter boundary. All monetary totals
//! are `i64` cents; no floating point enters a trading decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Price of one contract in cents, valid range 1..=99. 0 means "no price".
pub type PriceCents = u16;

/// Quantity in whole contracts.
pub type Qty = i64;

/// Sentinel for an absent price.
pub const NO_PRICE: PriceCents = 0;

/// Convert an f64 price on [0, 1] to cents, clamped to the valid band.
#[inline]
pub fn price_to_cents(price: f64) -> PriceCents {
    ((price * 100.0).round() as i64).clamp(0, 99) as PriceCents
}

/// Convert cents back to the [0, 1] decimal scale (display only).
#[inline]
pub fn cents_to_price(cents: PriceCents) -> f64 {
    cents as f64 / 100.0
}

/// Trading venue identifier.
///
/// The engine trades exactly two venues: `V1` is the crypto-settled CLOB,
/// `V2` the regulated USD CLOB. Everything else about a venue lives behind
/// its adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    V1,
    V2,
}

impl Venue {
    /// The opposite venue of a two-leg trade.
    pub fn other(self) -> Venue {
        match self {
            Venue::V1 => Venue::V2,
            Venue::V2 => Venue::V1,
        }
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Venue::V1 => write!(f, "v1"),
            Venue::V2 => write!(f, "v2"),
        }
    }
}

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderSide::Buy => write!(f, "buy"),
            OrderSide::Sell => write!(f, "sell"),
        }
    }
}

/// Contract side (YES or NO outcome).
///
/// Convention carried on every mapping's `outcome_alignment`: selling YES at
/// price p is economically equivalent to holding NO bought at (1 - p).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractSide {
    Yes,
    No,
}

impl std::fmt::Display for ContractSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContractSide::Yes => write!(f, "yes"),
            ContractSide::No => write!(f, "no"),
        }
    }
}

/// One resting level of an order book: (price, size in contracts).
pub type BookLevel = (PriceCents, Qty);

/// Snapshot of the top levels of a venue order book.
///
/// Invariants enforced by [`OrderBook::validate`]: bids sorted descending,
/// asks ascending, best bid strictly below best ask, all sizes positive.
/// `ts_ms` is the venue capture timestamp; per (venue, contract) it must be
/// monotone non-decreasing, which the book cache enforces by dropping stale
/// writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
    /// Venue capture time, unix milliseconds.
    pub ts_ms: u64,
}

impl OrderBook {
    /// Build a single-level book from top-of-book quotes.
    pub fn top(
        bid: PriceCents,
        bid_size: Qty,
        ask: PriceCents,
        ask_size: Qty,
        ts_ms: u64,
    ) -> Self {
        Self {
            bids: vec![(bid, bid_size)],
            asks: vec![(ask, ask_size)],
            ts_ms,
        }
    }

    /// Best resting bid, if any.
    #[inline]
    pub fn best_bid(&self) -> Option<BookLevel> {
        self.bids.first().copied()
    }

    /// Best resting ask, if any.
    #[inline]
    pub fn best_ask(&self) -> Option<BookLevel> {
        self.asks.first().copied()
    }

    /// Check the structural invariants of the snapshot.
    pub fn validate(&self) -> Result<(), String> {
        for w in self.bids.windows(2) {
            if w[0].0 < w[1].0 {
                return Err("bids not sorted descending".into());
            }
        }
        for w in self.asks.windows(2) {
            if w[0].0 > w[1].0 {
                return Err("asks not sorted ascending".into());
            }
        }
        if self
            .bids
            .iter()
            .chain(self.asks.iter())
            .any(|&(_, size)| size <= 0)
        {
            return Err("non-positive level size".into());
        }
        if let (Some((bid, _)), Some((ask, _))) = (self.best_bid(), self.best_ask()) {
            if bid >= ask {
                return Err(format!("crossed book: bid {}c >= ask {}c", bid, ask));
            }
        }
        Ok(())
    }
}

/// Venue account balance in USD cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub available_cents: i64,
    pub locked_cents: i64,
}

impl Balance {
    pub fn total_cents(&self) -> i64 {
        self.available_cents + self.locked_cents
    }
}

/// An open position, aggregated per (venue, contract, side) with
/// weighted-average cost. Discarded when reduced to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: String,
    pub venue: Venue,
    pub contract: String,
    /// Mapping this position hedges, when known.
    pub mapping_id: Option<String>,
    pub side: ContractSide,
    /// Contracts held; always positive while the position exists.
    pub qty: Qty,
    /// Weighted-average entry price in cents.
    pub avg_price_cents: i64,
    pub opened_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    /// Notional exposure of this position in cents.
    #[inline]
    pub fn notional_cents(&self) -> i64 {
        self.qty * self.avg_price_cents
    }

    /// Fold another fill of the same (venue, contract, side) into this
    /// position using the weighted-average cost formula.
    pub fn absorb(&mut self, qty: Qty, price_cents: i64, now: DateTime<Utc>) {
        let combined = self.qty + qty;
        if combined > 0 {
            self.avg_price_cents =
                (self.qty * self.avg_price_cents + qty * price_cents) / combined;
        }
        self.qty = combined;
        self.updated_at = now;
    }
}

/// Derived cross-venue inventory view for one mapping.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inventory {
    pub v1_yes: Qty,
    pub v1_no: Qty,
    pub v2_yes: Qty,
    pub v2_no: Qty,
    /// Signed net YES-equivalent quantity across venues.
    pub net_position: Qty,
    /// Net position valued at the reference price, cents.
    pub imbalance_value_cents: i64,
    pub needs_rebalance: bool,
}

impl Inventory {
    /// Compute the derived fields from raw per-venue quantities.
    ///
    /// A clean arbitrage holds YES on one venue and NO on the other in equal
    /// size; holding NO counts as negative YES exposure.
    pub fn derive(
        v1_yes: Qty,
        v1_no: Qty,
        v2_yes: Qty,
        v2_no: Qty,
        reference_price_cents: i64,
        max_imbalance: Qty,
    ) -> Self {
        let net = (v1_yes + v2_yes) - (v1_no + v2_no);
        Self {
            v1_yes,
            v1_no,
            v2_yes,
            v2_no,
            net_position: net,
            imbalance_value_cents: net.abs() * reference_price_cents,
            needs_rebalance: net.abs() > max_imbalance,
        }
    }
}

/// A time-bounded arbitrage candidate derived from two mapped tops of book.
///
/// `buy_venue` and `sell_venue` always differ, `sell_price > buy_price`, and
/// `net_total_cents = gross_total - est_fees_cents` at `max_qty`. Consumers
/// must re-check `expires_at` at read time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub mapping_id: String,
    pub buy_venue: Venue,
    pub buy_price: PriceCents,
    pub buy_available: Qty,
    pub sell_venue: Venue,
    pub sell_price: PriceCents,
    pub sell_available: Qty,
    /// Spread per contract before fees, cents.
    pub gross_spread_cents: u16,
    /// Estimated total fees at `max_qty`, cents.
    pub est_fees_cents: i64,
    /// Profit after fees at `max_qty`, cents.
    pub net_total_cents: i64,
    pub max_qty: Qty,
    /// 0.0 = deep book relative to the liquidity floor, 1.0 = razor thin.
    pub execution_risk: f64,
    pub expires_at: DateTime<Utc>,
}

impl Opportunity {
    #[inline]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Net profit per contract in cents (display/threshold math uses the
    /// integer totals, not this).
    pub fn net_per_unit(&self) -> f64 {
        if self.max_qty > 0 {
            self.net_total_cents as f64 / self.max_qty as f64
        } else {
            0.0
        }
    }

    /// Gross notional of the buy leg at `qty`, cents.
    #[inline]
    pub fn buy_notional_cents(&self, qty: Qty) -> i64 {
        self.buy_price as i64 * qty
    }
}

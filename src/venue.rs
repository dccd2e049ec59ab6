//! Venue adapter contract consumed by the core.
//!
//! Everything venue-specific (authentication, unit conversion, rate-limit
//! shaping, wire formats) lives behind [`VenueAdapter`]. The core only sees
//! canonical cent prices and the fill-or-kill semantics below.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::VenueResult;
use crate::types::{Balance, OrderBook, OrderSide, Position, PriceCents, Qty, Venue};

/// A fill-or-kill order: fully filled at `price_cents` or better,
/// immediately, or rejected entirely with no fill.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FokOrder {
    pub contract: String,
    pub side: OrderSide,
    pub price_cents: PriceCents,
    pub qty: Qty,
}

/// Outcome of a fill-or-kill placement.
///
/// The contract that keeps two-leg atomicity sound: `Rejected` GUARANTEES no
/// fill occurred on the venue. `TransportError` guarantees nothing: the
/// order may or may not rest as a fill, and the engine treats it as a
/// potential fill until reconciled against venue positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FillResult {
    Filled {
        fill_price_cents: PriceCents,
        fill_qty: Qty,
        fees_cents: i64,
        order_id: String,
        ts_ms: u64,
    },
    Rejected {
        reason: String,
        order_id: Option<String>,
    },
    TransportError {
        detail: String,
    },
}

impl FillResult {
    pub fn is_filled(&self) -> bool {
        matches!(self, FillResult::Filled { .. })
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, FillResult::Rejected { .. })
    }

    pub fn is_transport_error(&self) -> bool {
        matches!(self, FillResult::TransportError { .. })
    }
}

/// One push update from a venue book subscription.
#[derive(Debug, Clone)]
pub struct BookUpdate {
    pub venue: Venue,
    pub contract: String,
    pub book: OrderBook,
}

/// Capacity of the bounded push channel handed to subscribers.
pub const BOOK_CHANNEL_CAPACITY: usize = 256;

/// Normalized view of one venue.
///
/// Push updates from [`subscribe_book`](VenueAdapter::subscribe_book) are
/// additive only: the pull path (`get_order_book`) is authoritative at
/// execution time, and the engine always revalidates through it before
/// firing.
#[async_trait]
pub trait VenueAdapter: Send + Sync {
    /// Which venue this adapter fronts.
    fn venue(&self) -> Venue;

    /// Current top levels with the venue capture timestamp.
    async fn get_order_book(&self, contract: &str) -> VenueResult<OrderBook>;

    /// Place a fill-or-kill order. See [`FillResult`] for the atomicity
    /// contract.
    async fn place_fok(&self, order: &FokOrder) -> FillResult;

    /// Account balances.
    async fn get_balances(&self) -> VenueResult<Vec<Balance>>;

    /// Open positions as the venue sees them; used for reconciliation.
    async fn get_positions(&self) -> VenueResult<Vec<Position>>;

    /// Subscribe to push book updates for a contract. The returned receiver
    /// is bounded; a lagging consumer loses updates, never correctness.
    async fn subscribe_book(&self, contract: &str) -> VenueResult<mpsc::Receiver<BookUpdate>>;

    /// Cancel a resting order.
    async fn cancel_order(&self, order_id: &str) -> VenueResult<()>;
}

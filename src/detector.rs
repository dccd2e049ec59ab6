//! Opportunity detection over mapped tops of book.
//!
//! Pure integer-cent math: for a mapping and the two current books, evaluate
//! both trade directions net of fees and emit a short-lived [`Opportunity`]
//! when one clears the profit threshold. A per-mapping cache retains the
//! last emission under a hard TTL for the operator surface; consumers must
//! re-check expiry at read time.

use chrono::{DateTime, Duration, Utc};
use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::config::Config;
use crate::fees::{trade_fees_cents, FeeParams};
use crate::matcher::EventMapping;
use crate::types::{OrderBook, Opportunity, Qty, Venue};

/// Detection tuning, copied out of [`Config`] so detection stays pure.
#[derive(Debug, Clone)]
pub struct DetectorParams {
    pub min_profit_threshold_bps: u32,
    pub min_liquidity_depth: Qty,
    pub opportunity_ttl: Duration,
    pub fees: FeeParams,
}

impl DetectorParams {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            min_profit_threshold_bps: cfg.min_profit_threshold_bps,
            min_liquidity_depth: cfg.min_liquidity_depth,
            opportunity_ttl: cfg.opportunity_ttl(),
            fees: FeeParams::from_config(cfg),
        }
    }
}

/// One evaluated direction before the winner is picked.
struct DirectionCandidate {
    buy_venue: Venue,
    buy_price: u16,
    buy_available: Qty,
    sell_venue: Venue,
    sell_price: u16,
    sell_available: Qty,
    max_qty: Qty,
    gross_spread_cents: u16,
    est_fees_cents: i64,
    net_total_cents: i64,
}

pub struct ArbitrageDetector {
    params: DetectorParams,
    /// Last emitted opportunity per mapping id, TTL-bounded.
    cache: RwLock<FxHashMap<String, Opportunity>>,
}

impl ArbitrageDetector {
    pub fn new(params: DetectorParams) -> Self {
        Self {
            params,
            cache: RwLock::new(FxHashMap::default()),
        }
    }

    pub fn params(&self) -> &DetectorParams {
        &self.params
    }

    /// Evaluate one direction: buy the ask on `buy_venue`, sell into the bid
    /// on `sell_venue`. Returns `None` unless the spread clears fees plus
    /// the fractional profit floor on the buy notional.
    fn evaluate_direction(
        &self,
        buy_venue: Venue,
        buy_book: &OrderBook,
        sell_venue: Venue,
        sell_book: &OrderBook,
    ) -> Option<DirectionCandidate> {
        let (ask, ask_size) = buy_book.best_ask()?;
        let (bid, bid_size) = sell_book.best_bid()?;

        // Prices must be strictly inside (0, 1).
        if ask == 0 || ask >= 100 || bid == 0 || bid >= 100 {
            return None;
        }
        // The direction exists only when the buy side is cheaper.
        if ask >= bid {
            return None;
        }

        let max_qty = ask_size.min(bid_size);
        if max_qty <= 0 {
            return None;
        }

        let gross_spread = (bid - ask) as i64;
        let gross_total = gross_spread * max_qty;
        let est_fees = trade_fees_cents(&self.params.fees, buy_venue, sell_venue, ask, bid, max_qty);
        let net_total = gross_total - est_fees;

        // net_total / buy_notional > threshold, cross-multiplied to stay in
        // integers: net_total * 10_000 > bps * buy_price * qty.
        let buy_notional = ask as i64 * max_qty;
        if net_total * 10_000 <= self.params.min_profit_threshold_bps as i64 * buy_notional {
            return None;
        }

        Some(DirectionCandidate {
            buy_venue,
            buy_price: ask,
            buy_available: ask_size,
            sell_venue,
            sell_price: bid,
            sell_available: bid_size,
            max_qty,
            gross_spread_cents: gross_spread as u16,
            est_fees_cents: est_fees,
            net_total_cents: net_total,
        })
    }

    /// Detect the best opportunity for a mapping from the two current books.
    ///
    /// The winning direction (by net total) is recorded in the per-mapping
    /// cache and returned. Emits `None` when neither direction clears the
    /// threshold, when the book is thinner than `min_liquidity_depth`, or
    /// when the mapping's outcome alignment is not the direct convention.
    pub async fn detect(
        &self,
        mapping: &EventMapping,
        v1_book: &OrderBook,
        v2_book: &OrderBook,
        now: DateTime<Utc>,
    ) -> Option<Opportunity> {
        // Inverted listings would need leg transformation this engine does
        // not perform; refuse rather than trade the wrong side.
        if mapping.outcome_alignment != "yes_yes" {
            debug!(
                "mapping {} has unsupported alignment '{}'",
                mapping.id, mapping.outcome_alignment
            );
            return None;
        }

        let a = self.evaluate_direction(Venue::V1, v1_book, Venue::V2, v2_book);
        let b = self.evaluate_direction(Venue::V2, v2_book, Venue::V1, v1_book);

        let winner = match (a, b) {
            (Some(a), Some(b)) => {
                if a.net_total_cents >= b.net_total_cents {
                    a
                } else {
                    b
                }
            }
            (Some(a), None) => a,
            (None, Some(b)) => b,
            (None, None) => return None,
        };

        if winner.max_qty < self.params.min_liquidity_depth {
            debug!(
                "opportunity on {} too thin: {} < {}",
                mapping.id, winner.max_qty, self.params.min_liquidity_depth
            );
            return None;
        }

        let opportunity = Opportunity {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            mapping_id: mapping.id.clone(),
            buy_venue: winner.buy_venue,
            buy_price: winner.buy_price,
            buy_available: winner.buy_available,
            sell_venue: winner.sell_venue,
            sell_price: winner.sell_price,
            sell_available: winner.sell_available,
            gross_spread_cents: winner.gross_spread_cents,
            est_fees_cents: winner.est_fees_cents,
            net_total_cents: winner.net_total_cents,
            max_qty: winner.max_qty,
            execution_risk: self.execution_risk(winner.max_qty),
            expires_at: now + self.params.opportunity_ttl,
        };

        let mut cache = self.cache.write().await;
        cache.insert(mapping.id.clone(), opportunity.clone());
        Some(opportunity)
    }

    /// Thin books are risky to cross: risk decreases as depth grows past the
    /// liquidity floor, reaching 0 at four times the floor.
    fn execution_risk(&self, max_qty: Qty) -> f64 {
        let floor = self.params.min_liquidity_depth.max(1) as f64;
        (1.0 - max_qty as f64 / (4.0 * floor)).clamp(0.0, 1.0)
    }

    /// Last cached opportunity for a mapping, `None` once expired.
    pub async fn last_opportunity(&self, mapping_id: &str, now: DateTime<Utc>) -> Option<Opportunity> {
        let cache = self.cache.read().await;
        cache
            .get(mapping_id)
            .filter(|o| !o.is_expired(now))
            .cloned()
    }

    /// All cached, unexpired opportunities (operator surface).
    pub async fn cached_opportunities(&self, now: DateTime<Utc>) -> Vec<Opportunity> {
        let cache = self.cache.read().await;
        let mut live: Vec<Opportunity> = cache
            .values()
            .filter(|o| !o.is_expired(now))
            .cloned()
            .collect();
        live.sort_by(|a, b| b.net_total_cents.cmp(&a.net_total_cents));
        live
    }

    /// Drop expired entries; returns how many were swept.
    pub async fn clear_expired(&self, now: DateTime<Utc>) -> usize {
        let mut cache = self.cache.write().await;
        let before = cache.len();
        cache.retain(|_, o| !o.is_expired(now));
        before - cache.len()
    }
}

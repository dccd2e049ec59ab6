//! Shared order-book cache fed by both the push and pull paths.
//!
//! One slot per (venue, contract), last-writer-wins guarded by the venue
//! capture timestamp: an update older than the cached snapshot is dropped,
//! which keeps per-slot observations monotone even when push frames arrive
//! out of order after a reconnect.

use rustc_hash::FxHashMap;
use tokio::sync::RwLock;
use tracing::debug;

use crate::types::{OrderBook, Venue};

type SlotKey = (Venue, String);

#[derive(Default)]
pub struct BookCache {
    slots: RwLock<FxHashMap<SlotKey, OrderBook>>,
}

impl BookCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a snapshot unless a newer one is already cached. Structurally
    /// invalid books are rejected outright. Returns whether the write took.
    pub async fn update(&self, venue: Venue, contract: &str, book: OrderBook) -> bool {
        if let Err(reason) = book.validate() {
            debug!(
                "dropping invalid book for {}:{}: {}",
                venue, contract, reason
            );
            return false;
        }

        let mut slots = self.slots.write().await;
        let key = (venue, contract.to_string());
        match slots.get(&key) {
            Some(existing) if existing.ts_ms > book.ts_ms => {
                debug!(
                    "dropping stale book for {}:{} ({} < {})",
                    venue, contract, book.ts_ms, existing.ts_ms
                );
                false
            }
            _ => {
                slots.insert(key, book);
                true
            }
        }
    }

    /// Latest cached snapshot for a slot.
    pub async fn get(&self, venue: Venue, contract: &str) -> Option<OrderBook> {
        let slots = self.slots.read().await;
        slots.get(&(venue, contract.to_string())).cloned()
    }

    /// Age of the cached snapshot in milliseconds against `now_ms`, if any.
    pub async fn age_ms(&self, venue: Venue, contract: &str, now_ms: u64) -> Option<u64> {
        self.get(venue, contract)
            .await
            .map(|b| now_ms.saturating_sub(b.ts_ms))
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}

//! Deterministic in-memory venue for integration tests.
//!
//! Books, balances, fill outcomes, latencies and read errors are all
//! scriptable, and fills accumulate into venue-visible positions so the
//! engine's reconciliation path can be exercised end to end.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use uuid::Uuid;

use crate::error::{VenueError, VenueResult};
use crate::types::{Balance, ContractSide, OrderBook, OrderSide, Position, Venue};
use crate::venue::{BookUpdate, FillResult, FokOrder, VenueAdapter, BOOK_CHANNEL_CAPACITY};

use rustc_hash::FxHashMap;

#[derive(Default)]
struct SimState {
    books: FxHashMap<String, OrderBook>,
    balances: Vec<Balance>,
    positions: Vec<Position>,
    /// Scripted placement outcomes, consumed in order; empty means "derive
    /// the outcome from the book".
    forced_fills: VecDeque<FillResult>,
    /// Scripted order-book read errors, consumed in order.
    book_errors: VecDeque<VenueError>,
    /// Artificial placement latency.
    place_delay: Option<Duration>,
    order_seq: u64,
}

pub struct SimVenue {
    venue: Venue,
    state: Mutex<SimState>,
    subscribers: Mutex<Vec<(String, mpsc::Sender<BookUpdate>)>>,
}

impl SimVenue {
    pub fn new(venue: Venue) -> Arc<Self> {
        Arc::new(Self {
            venue,
            state: Mutex::new(SimState::default()),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    /// Install the current book for a contract and fan it out to
    /// subscribers.
    pub async fn set_book(&self, contract: &str, book: OrderBook) {
        {
            let mut state = self.state.lock().await;
            state.books.insert(contract.to_string(), book.clone());
        }
        let subscribers = self.subscribers.lock().await;
        for (subscribed, tx) in subscribers.iter() {
            if subscribed == contract {
                let _ = tx.try_send(BookUpdate {
                    venue: self.venue,
                    contract: contract.to_string(),
                    book: book.clone(),
                });
            }
        }
    }

    pub async fn set_balances(&self, balances: Vec<Balance>) {
        self.state.lock().await.balances = balances;
    }

    /// Queue an outcome for the next `place_fok`, overriding book-derived
    /// behavior.
    pub async fn force_next_fill(&self, result: FillResult) {
        self.state.lock().await.forced_fills.push_back(result);
    }

    /// Queue an error for the next `get_order_book`.
    pub async fn fail_next_book_read(&self, error: VenueError) {
        self.state.lock().await.book_errors.push_back(error);
    }

    pub async fn set_place_delay(&self, delay: Option<Duration>) {
        self.state.lock().await.place_delay = delay;
    }

    /// Seed a pre-existing position (for reconciliation scenarios).
    pub async fn seed_position(&self, position: Position) {
        self.state.lock().await.positions.push(position);
    }

    pub async fn placed_order_count(&self) -> u64 {
        self.state.lock().await.order_seq
    }

    fn record_fill(state: &mut SimState, venue: Venue, order: &FokOrder, fill_price: u16) {
        let now = Utc::now();
        let (side, price) = match order.side {
            OrderSide::Buy => (ContractSide::Yes, fill_price as i64),
            // A sold YES rests as the NO side at the complement price.
            OrderSide::Sell => (ContractSide::No, 100 - fill_price as i64),
        };
        state.positions.push(Position {
            id: Uuid::new_v4().to_string(),
            venue,
            contract: order.contract.clone(),
            mapping_id: None,
            side,
            qty: order.qty,
            avg_price_cents: price,
            opened_at: now,
            updated_at: now,
        });
    }
}

#[async_trait]
impl VenueAdapter for SimVenue {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn get_order_book(&self, contract: &str) -> VenueResult<OrderBook> {
        let mut state = self.state.lock().await;
        if let Some(err) = state.book_errors.pop_front() {
            return Err(err);
        }
        state
            .books
            .get(contract)
            .cloned()
            .ok_or_else(|| VenueError::NotFound(format!("no book for {}", contract)))
    }

    async fn place_fok(&self, order: &FokOrder) -> FillResult {
        let delay = { self.state.lock().await.place_delay };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        state.order_seq += 1;
        let order_id = format!("{}-{}", self.venue, state.order_seq);

        if let Some(forced) = state.forced_fills.pop_front() {
            if let FillResult::Filled {
                fill_price_cents,
                fill_qty,
                ..
            } = &forced
            {
                let price = *fill_price_cents;
                let qty = *fill_qty;
                let scripted = FokOrder { qty, ..order.clone() };
                Self::record_fill(&mut state, self.venue, &scripted, price);
            }
            return forced;
        }

        // Book-derived FOK: full size at the limit price or better, or
        // nothing.
        let Some(book) = state.books.get(&order.contract).cloned() else {
            return FillResult::Rejected {
                reason: "unknown contract".into(),
                order_id: Some(order_id),
            };
        };
        let fill = match order.side {
            OrderSide::Buy => book
                .best_ask()
                .filter(|(price, size)| *price <= order.price_cents && *size >= order.qty)
                .map(|(price, _)| price),
            OrderSide::Sell => book
                .best_bid()
                .filter(|(price, size)| *price >= order.price_cents && *size >= order.qty)
                .map(|(price, _)| price),
        };

        match fill {
            Some(price) => {
                Self::record_fill(&mut state, self.venue, order, price);
                FillResult::Filled {
                    fill_price_cents: price,
                    fill_qty: order.qty,
                    fees_cents: 0,
                    order_id,
                    ts_ms: Utc::now().timestamp_millis() as u64,
                }
            }
            None => FillResult::Rejected {
                reason: "fok not fillable at limit".into(),
                order_id: Some(order_id),
            },
        }
    }

    async fn get_balances(&self) -> VenueResult<Vec<Balance>> {
        Ok(self.state.lock().await.balances.clone())
    }

    async fn get_positions(&self) -> VenueResult<Vec<Position>> {
        Ok(self.state.lock().await.positions.clone())
    }

    async fn subscribe_book(&self, contract: &str) -> VenueResult<mpsc::Receiver<BookUpdate>> {
        let (tx, rx) = mpsc::channel(BOOK_CHANNEL_CAPACITY);
        self.subscribers
            .lock()
            .await
            .push((contract.to_string(), tx));
        Ok(rx)
    }

    async fn cancel_order(&self, _order_id: &str) -> VenueResult<()> {
        Ok(())
    }
}

//! Push-path book feed: one task per venue.
//!
//! Drains the adapter's subscription channels into the shared book cache.
//! The cache's timestamp check makes out-of-order frames harmless, so this
//! task only has to care about liveness: a heartbeat gap forces a
//! resubscribe with exponential backoff, and exhausting the reconnect
//! budget raises `ConnectionLost` on the circuit breaker.
//!
//! Push is additive. The engine's pull path stays authoritative at
//! execution time, so losing this feed degrades freshness, never
//! correctness.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::books::BookCache;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::Config;
use crate::error::FailureKind;
use crate::venue::{BookUpdate, VenueAdapter, BOOK_CHANNEL_CAPACITY};

/// Reconnect and liveness policy for one venue feed.
#[derive(Debug, Clone)]
pub struct FeedPolicy {
    pub reconnect_initial_ms: u64,
    pub reconnect_cap_ms: u64,
    pub reconnect_max_attempts: u32,
    pub heartbeat_timeout: Duration,
}

impl FeedPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            reconnect_initial_ms: cfg.ws_reconnect_initial_ms,
            reconnect_cap_ms: cfg.ws_reconnect_cap_ms,
            reconnect_max_attempts: cfg.ws_reconnect_max_attempts,
            heartbeat_timeout: Duration::from_secs(cfg.heartbeat_timeout_s),
        }
    }

    /// Delay before reconnect `attempt` (1-based): initial x2 per attempt,
    /// capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let ms = self
            .reconnect_initial_ms
            .saturating_mul(1u64 << exponent)
            .min(self.reconnect_cap_ms);
        Duration::from_millis(ms)
    }
}

/// Run the feed for one venue until shutdown or reconnect exhaustion.
pub async fn run_book_feed(
    adapter: Arc<dyn VenueAdapter>,
    contracts: Vec<String>,
    books: Arc<BookCache>,
    breaker: Arc<CircuitBreaker>,
    policy: FeedPolicy,
    mut shutdown: watch::Receiver<bool>,
) {
    let venue = adapter.venue();
    let mut attempt: u32 = 0;

    'session: loop {
        if *shutdown.borrow() {
            return;
        }

        // Subscribe every contract and merge the channels.
        let (merged_tx, mut merged_rx) = mpsc::channel::<BookUpdate>(BOOK_CHANNEL_CAPACITY);
        let mut forwarders = Vec::new();
        let mut subscribed = 0usize;
        for contract in &contracts {
            match adapter.subscribe_book(contract).await {
                Ok(mut rx) => {
                    subscribed += 1;
                    let tx = merged_tx.clone();
                    forwarders.push(tokio::spawn(async move {
                        while let Some(update) = rx.recv().await {
                            if tx.send(update).await.is_err() {
                                break;
                            }
                        }
                    }));
                }
                Err(e) => {
                    warn!("{}: subscribe {} failed: {}", venue, contract, e);
                }
            }
        }
        drop(merged_tx);

        if subscribed == 0 {
            attempt += 1;
            if exhausted(venue, attempt, &policy, &breaker).await {
                return;
            }
            tokio::time::sleep(policy.backoff(attempt)).await;
            continue 'session;
        }

        info!(
            event = "feed_connected",
            venue = %venue,
            contracts = subscribed,
            "Book feed subscribed"
        );

        // Drain until shutdown, a heartbeat gap, or all senders closing.
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        for f in &forwarders { f.abort(); }
                        return;
                    }
                }
                update = merged_rx.recv() => {
                    match update {
                        Some(update) => {
                            attempt = 0;
                            books
                                .update(update.venue, &update.contract, update.book)
                                .await;
                        }
                        None => {
                            warn!("{}: feed channels closed", venue);
                            break;
                        }
                    }
                }
                _ = tokio::time::sleep(policy.heartbeat_timeout) => {
                    warn!(
                        event = "heartbeat_gap",
                        venue = %venue,
                        timeout_s = policy.heartbeat_timeout.as_secs(),
                        "No push update within the heartbeat window, reconnecting"
                    );
                    break;
                }
            }
        }

        for f in &forwarders {
            f.abort();
        }
        attempt += 1;
        if exhausted(venue, attempt, &policy, &breaker).await {
            return;
        }
        let delay = policy.backoff(attempt);
        info!(
            event = "feed_reconnect",
            venue = %venue,
            attempt = attempt,
            delay_ms = delay.as_millis() as u64,
            "Reconnecting book feed"
        );
        tokio::time::sleep(delay).await;
    }
}

async fn exhausted(
    venue: crate::types::Venue,
    attempt: u32,
    policy: &FeedPolicy,
    breaker: &Arc<CircuitBreaker>,
) -> bool {
    if attempt > policy.reconnect_max_attempts {
        warn!(
            event = "feed_exhausted",
            venue = %venue,
            attempts = attempt - 1,
            "Reconnect budget exhausted"
        );
        breaker.record_failure(FailureKind::ConnectionLost).await;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim::SimVenue;
    use crate::alert::test_support::CapturingAlerter;
    use crate::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
    use crate::state::StateStore;
    use crate::types::{OrderBook, Venue};

    fn policy() -> FeedPolicy {
        FeedPolicy {
            reconnect_initial_ms: 10,
            reconnect_cap_ms: 40,
            reconnect_max_attempts: 2,
            heartbeat_timeout: Duration::from_millis(200),
        }
    }

    fn breaker() -> Arc<CircuitBreaker> {
        let path = std::env::temp_dir()
            .join("cross_venue_arb_feed_tests")
            .join(format!("{}.json", uuid::Uuid::new_v4()));
        Arc::new(CircuitBreaker::new(
            CircuitBreakerConfig::default(),
            Arc::new(StateStore::load(path, 5)),
            Arc::new(CapturingAlerter::default()),
        ))
    }

    #[test]
    fn test_backoff_schedule() {
        let p = policy();
        assert_eq!(p.backoff(1), Duration::from_millis(10));
        assert_eq!(p.backoff(2), Duration::from_millis(20));
        assert_eq!(p.backoff(3), Duration::from_millis(40));
        assert_eq!(p.backoff(10), Duration::from_millis(40)); // capped
    }

    #[tokio::test]
    async fn test_feed_populates_cache() {
        let sim = SimVenue::new(Venue::V1);
        let books = Arc::new(BookCache::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let feed = tokio::spawn(run_book_feed(
            sim.clone(),
            vec!["c1".to_string()],
            books.clone(),
            breaker(),
            policy(),
            shutdown_rx,
        ));

        // Give the feed a beat to subscribe, then push.
        tokio::time::sleep(Duration::from_millis(50)).await;
        sim.set_book("c1", OrderBook::top(40, 100, 42, 100, 5)).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        let cached = books.get(Venue::V1, "c1").await.expect("book cached");
        assert_eq!(cached.ts_ms, 5);

        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(1), feed).await;
    }

    #[tokio::test]
    async fn test_heartbeat_exhaustion_trips_connection_lost() {
        let sim = SimVenue::new(Venue::V2);
        let books = Arc::new(BookCache::new());
        let cb = breaker();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        // Never push anything: every session times out on heartbeat until
        // the reconnect budget is gone.
        let feed = tokio::spawn(run_book_feed(
            sim.clone(),
            vec!["c1".to_string()],
            books,
            cb.clone(),
            policy(),
            shutdown_rx,
        ));

        tokio::time::timeout(Duration::from_secs(5), feed)
            .await
            .expect("feed should exit after exhaustion")
            .unwrap();
        assert!(cb.is_paused());
        assert_eq!(
            cb.status().await.reason.as_deref(),
            Some("connection_lost")
        );
    }
}

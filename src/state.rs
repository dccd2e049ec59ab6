//! Durable process state: daily counters, circuit-breaker flag, open
//! positions, heartbeat.
//!
//! The snapshot document is a single JSON file replaced atomically
//! (write-tempfile-then-rename), so a crash at any byte leaves either the
//! old or the new complete state readable. Unknown fields in a snapshot are
//! preserved across load/save for forward compatibility.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::types::{ContractSide, Position, Qty};

/// Persisted circuit-breaker fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CbPersisted {
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<DateTime<Utc>>,
}

/// The snapshot document. All money in integer cents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineState {
    pub daily_pnl_cents: i64,
    pub daily_trade_count: u64,
    /// Contracts traded today across both legs.
    pub daily_volume: i64,
    /// UTC trading day, `YYYY-MM-DD`. Daily fields reset when it rolls.
    pub trading_date: String,
    pub cb: CbPersisted,
    pub positions: Vec<Position>,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_successful_trade: Option<DateTime<Utc>>,
    /// Fields written by newer builds survive a round-trip through this one.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EngineState {
    /// Zero state for a fresh installation.
    pub fn zero(now: DateTime<Utc>) -> Self {
        Self {
            daily_pnl_cents: 0,
            daily_trade_count: 0,
            daily_volume: 0,
            trading_date: trading_date(now),
            cb: CbPersisted::default(),
            positions: Vec::new(),
            last_heartbeat: now,
            last_successful_trade: None,
            extra: serde_json::Map::new(),
        }
    }

    fn reset_daily(&mut self, now: DateTime<Utc>) {
        self.daily_pnl_cents = 0;
        self.daily_trade_count = 0;
        self.daily_volume = 0;
        self.trading_date = trading_date(now);
    }
}

/// Format a UTC instant as the trading-day key.
pub fn trading_date(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

/// Owner of the snapshot document and the canonical position set.
pub struct StateStore {
    path: PathBuf,
    inner: Mutex<EngineState>,
    /// Consecutive snapshot I/O failures; cleared by any success.
    io_failures: AtomicU32,
    escalation_threshold: u32,
}

impl StateStore {
    /// Load the last snapshot, or a zero state when none exists. A snapshot
    /// from a previous trading day has its daily fields reset before any
    /// caller can observe them. A corrupt snapshot is preserved on disk and
    /// a zero state returned; trading from guessed state is worse than
    /// starting flat.
    pub fn load(path: impl AsRef<Path>, escalation_threshold: u32) -> Self {
        let path = path.as_ref().to_path_buf();
        let now = Utc::now();

        let state = match std::fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<EngineState>(&raw) {
                Ok(mut state) => {
                    if state.trading_date != trading_date(now) {
                        info!(
                            "Trading date rollover: {} -> {}, daily counters reset",
                            state.trading_date,
                            trading_date(now)
                        );
                        state.reset_daily(now);
                    }
                    info!(
                        "State loaded: {} positions, daily pnl {}c, cb.paused={}",
                        state.positions.len(),
                        state.daily_pnl_cents,
                        state.cb.paused
                    );
                    state
                }
                Err(e) => {
                    error!(
                        "State file {} unreadable ({}); starting from zero state",
                        path.display(),
                        e
                    );
                    EngineState::zero(now)
                }
            },
            Err(_) => {
                info!("No state file at {}, starting fresh", path.display());
                EngineState::zero(now)
            }
        };

        Self {
            path,
            inner: Mutex::new(state),
            io_failures: AtomicU32::new(0),
            escalation_threshold,
        }
    }

    /// Copy-then-write snapshot: the state object is cloned under the lock,
    /// serialized outside it, and swapped into place via rename.
    pub async fn snapshot(&self) -> std::io::Result<()> {
        let state = {
            let mut inner = self.inner.lock().await;
            inner.last_heartbeat = Utc::now();
            inner.clone()
        };

        match self.write_atomic(&state) {
            Ok(()) => {
                self.io_failures.store(0, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                let failures = self.io_failures.fetch_add(1, Ordering::AcqRel) + 1;
                warn!(
                    "State snapshot failed ({} consecutive): {}",
                    failures, e
                );
                Err(e)
            }
        }
    }

    fn write_atomic(&self, state: &EngineState) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(state)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)
    }

    /// Whether snapshot failures have crossed the escalation threshold.
    pub fn io_failures_exceeded(&self) -> bool {
        self.io_failures.load(Ordering::Acquire) >= self.escalation_threshold
    }

    /// Record a completed (or hypothetical) round trip into the daily
    /// counters. Rolls the trading day first if midnight passed since the
    /// last write.
    pub async fn record_trade(&self, realized_pnl_cents: i64, volume: Qty) {
        let now = Utc::now();
        let mut inner = self.inner.lock().await;
        if inner.trading_date != trading_date(now) {
            info!("Trading date rollover during session, daily counters reset");
            inner.reset_daily(now);
        }
        inner.daily_pnl_cents += realized_pnl_cents;
        inner.daily_trade_count += 1;
        inner.daily_volume += volume;
        inner.last_successful_trade = Some(now);
    }

    /// Persist the circuit-breaker flag. When pausing, the snapshot is
    /// written before returning so the pause is durable before any caller
    /// observes it.
    pub async fn set_cb(
        &self,
        paused: bool,
        reason: Option<String>,
        paused_at: Option<DateTime<Utc>>,
    ) -> std::io::Result<()> {
        {
            let mut inner = self.inner.lock().await;
            inner.cb = CbPersisted {
                paused,
                reason,
                paused_at,
            };
        }
        let result = self.snapshot().await;
        if paused {
            // A pause that did not reach disk is not a pause.
            result
        } else {
            if let Err(e) = result {
                warn!("Resume persisted in memory only: {}", e);
            }
            Ok(())
        }
    }

    /// Aggregate a fill into the canonical position set, keyed by
    /// (venue, contract, side). Positions reduced to zero are dropped.
    pub async fn apply_position(&self, position: Position) {
        let mut inner = self.inner.lock().await;
        let now = Utc::now();
        if let Some(existing) = inner.positions.iter_mut().find(|p| {
            p.venue == position.venue
                && p.contract == position.contract
                && p.side == position.side
        }) {
            existing.absorb(position.qty, position.avg_price_cents, now);
        } else {
            inner.positions.push(position);
        }
        inner.positions.retain(|p| p.qty > 0);
    }

    /// Replace the canonical position set (reconciliation).
    pub async fn set_positions(&self, positions: Vec<Position>) {
        let mut inner = self.inner.lock().await;
        inner.positions = positions.into_iter().filter(|p| p.qty > 0).collect();
    }

    pub async fn positions(&self) -> Vec<Position> {
        self.inner.lock().await.positions.clone()
    }

    pub async fn cb_state(&self) -> CbPersisted {
        self.inner.lock().await.cb.clone()
    }

    /// Clone of the full document (operator surface, recovery gate).
    pub async fn current(&self) -> EngineState {
        self.inner.lock().await.clone()
    }

    /// Age of the last heartbeat in minutes.
    pub async fn state_age_minutes(&self, now: DateTime<Utc>) -> i64 {
        let inner = self.inner.lock().await;
        (now - inner.last_heartbeat).num_minutes()
    }

    /// True when any open position lacks its offsetting leg on the other
    /// venue, the signature of an interrupted two-leg trade.
    pub async fn has_unhedged_positions(&self) -> bool {
        let inner = self.inner.lock().await;
        for p in &inner.positions {
            let hedged = inner.positions.iter().any(|q| {
                q.id != p.id
                    && q.venue == p.venue.other()
                    && q.mapping_id.is_some()
                    && q.mapping_id == p.mapping_id
                    && q.qty == p.qty
            });
            if !hedged {
                return true;
            }
        }
        false
    }
}

/// Hedged-pair helper shared with the risk ledger: a clean arbitrage holds
/// YES-equivalents of equal size on opposite venues.
pub fn opposite_side(side: ContractSide) -> ContractSide {
    match side {
        ContractSide::Yes => ContractSide::No,
        ContractSide::No => ContractSide::Yes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Venue;

    fn tmp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join("cross_venue_arb_state_tests")
            .join(format!("{}_{}.json", name, uuid::Uuid::new_v4()))
    }

    fn position(venue: Venue, contract: &str, qty: Qty, price: i64) -> Position {
        let now = Utc::now();
        Position {
            id: uuid::Uuid::new_v4().to_string(),
            venue,
            contract: contract.to_string(),
            mapping_id: Some("m1".to_string()),
            side: ContractSide::Yes,
            qty,
            avg_price_cents: price,
            opened_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_zero_state_when_absent() {
        let store = StateStore::load(tmp_path("absent"), 5);
        let state = store.current().await;
        assert_eq!(state.daily_pnl_cents, 0);
        assert_eq!(state.daily_trade_count, 0);
        assert!(state.positions.is_empty());
        assert!(!state.cb.paused);
        assert_eq!(state.trading_date, trading_date(Utc::now()));
    }

    #[tokio::test]
    async fn test_snapshot_then_load_round_trip() {
        let path = tmp_path("round_trip");
        let store = StateStore::load(&path, 5);
        store.record_trade(316, 200).await;
        store
            .apply_position(position(Venue::V1, "c1", 100, 42))
            .await;
        store.snapshot().await.unwrap();

        let reloaded = StateStore::load(&path, 5);
        let state = reloaded.current().await;
        assert_eq!(state.daily_pnl_cents, 316);
        assert_eq!(state.daily_trade_count, 1);
        assert_eq!(state.daily_volume, 200);
        assert_eq!(state.positions.len(), 1);
        assert_eq!(state.positions[0].qty, 100);
        assert!(state.last_successful_trade.is_some());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_interrupted_write_leaves_old_state() {
        let path = tmp_path("interrupted");
        let store = StateStore::load(&path, 5);
        store.record_trade(100, 10).await;
        store.snapshot().await.unwrap();

        // Simulate a crash mid-write: a partial temp file next to the
        // snapshot. The real file must still read back complete.
        std::fs::write(path.with_extension("json.tmp"), "{\"daily_pnl_cents\": 9").unwrap();

        let reloaded = StateStore::load(&path, 5);
        assert_eq!(reloaded.current().await.daily_pnl_cents, 100);

        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(path.with_extension("json.tmp"));
    }

    #[tokio::test]
    async fn test_daily_rollover_on_load() {
        let path = tmp_path("rollover");
        let store = StateStore::load(&path, 5);
        store.record_trade(500, 50).await;

        // Rewrite the snapshot with a stale trading date.
        {
            let mut state = store.current().await;
            state.trading_date = "2000-01-01".to_string();
            let json = serde_json::to_string(&state).unwrap();
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, json).unwrap();
        }

        let reloaded = StateStore::load(&path, 5);
        let state = reloaded.current().await;
        assert_eq!(state.daily_pnl_cents, 0);
        assert_eq!(state.daily_trade_count, 0);
        assert_eq!(state.trading_date, trading_date(Utc::now()));

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_unknown_fields_preserved() {
        let path = tmp_path("forward_compat");
        {
            let store = StateStore::load(&path, 5);
            store.snapshot().await.unwrap();
        }

        // A newer build added a field this version does not know about.
        let mut doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        doc.as_object_mut()
            .unwrap()
            .insert("future_field".to_string(), serde_json::json!({"v": 2}));
        std::fs::write(&path, serde_json::to_string(&doc).unwrap()).unwrap();

        let store = StateStore::load(&path, 5);
        store.snapshot().await.unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("future_field"), "unknown field dropped: {}", raw);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_set_cb_durable_pause() {
        let path = tmp_path("cb");
        let store = StateStore::load(&path, 5);
        store
            .set_cb(true, Some("asymmetric_execution".into()), Some(Utc::now()))
            .await
            .unwrap();

        let reloaded = StateStore::load(&path, 5);
        let cb = reloaded.cb_state().await;
        assert!(cb.paused);
        assert_eq!(cb.reason.as_deref(), Some("asymmetric_execution"));
        assert!(cb.paused_at.is_some());

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_position_aggregation_and_drop_at_zero() {
        let store = StateStore::load(tmp_path("agg"), 5);
        store.apply_position(position(Venue::V1, "c1", 10, 40)).await;
        store.apply_position(position(Venue::V1, "c1", 10, 50)).await;

        let positions = store.positions().await;
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].qty, 20);
        assert_eq!(positions[0].avg_price_cents, 45);

        store.set_positions(vec![]).await;
        assert!(store.positions().await.is_empty());
    }

    #[tokio::test]
    async fn test_unhedged_detection() {
        let store = StateStore::load(tmp_path("unhedged"), 5);
        store.apply_position(position(Venue::V1, "c1", 10, 40)).await;
        assert!(store.has_unhedged_positions().await);

        // Matching size on the other venue for the same mapping: hedged.
        store.apply_position(position(Venue::V2, "c2", 10, 55)).await;
        assert!(!store.has_unhedged_positions().await);
    }

    #[tokio::test]
    async fn test_io_failure_counter() {
        // Point the store at a path whose parent is a file, so snapshots
        // must fail.
        let bad_parent = std::env::temp_dir().join(format!("file_{}", uuid::Uuid::new_v4()));
        std::fs::write(&bad_parent, "x").unwrap();
        let store = StateStore::load(bad_parent.join("state.json"), 2);

        assert!(store.snapshot().await.is_err());
        assert!(!store.io_failures_exceeded());
        assert!(store.snapshot().await.is_err());
        assert!(store.io_failures_exceeded());

        let _ = std::fs::remove_file(&bad_parent);
    }

    #[test]
    fn test_opposite_side() {
        assert_eq!(opposite_side(ContractSide::Yes), ContractSide::No);
        assert_eq!(opposite_side(ContractSide::No), ContractSide::Yes);
    }
}

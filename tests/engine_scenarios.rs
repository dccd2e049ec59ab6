//! End-to-end scenarios against the reference in-memory venues.
//!
//! These drive the supervisor scan path (matcher, book cache, detector,
//! risk, execution, breaker, state) exactly the way the binary wires it.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use chrono::Utc;

use cross_venue_arb::adapters::sim::SimVenue;
use cross_venue_arb::alert::{Alerter, LogAlerter};
use cross_venue_arb::books::BookCache;
use cross_venue_arb::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use cross_venue_arb::config::{Config, OperatingMode};
use cross_venue_arb::detector::{ArbitrageDetector, DetectorParams};
use cross_venue_arb::execution::{ExecutionEngine, ModeFlag};
use cross_venue_arb::matcher::{EventMatcher, MatcherConfig};
use cross_venue_arb::records::{ExecutionStatus, RecordSink};
use cross_venue_arb::risk::{RiskLimits, RiskManager};
use cross_venue_arb::state::StateStore;
use cross_venue_arb::supervisor::{scan_once, startup_gate, Services, VenueHealth};
use cross_venue_arb::types::{OrderBook, Venue};
use cross_venue_arb::venue::{FillResult, VenueAdapter};

struct TestRig {
    services: Arc<Services>,
    v1: Arc<SimVenue>,
    v2: Arc<SimVenue>,
    tmp: std::path::PathBuf,
}

impl TestRig {
    fn cleanup(&self) {
        let _ = std::fs::remove_dir_all(&self.tmp);
    }
}

fn scenario_config() -> Config {
    let mut cfg = Config::from_env();
    // The classic fixture: 3% profit floor, 50-contract liquidity floor.
    cfg.min_profit_threshold_bps = 300;
    cfg.min_liquidity_depth = 50;
    cfg.min_profit_abs_cents = 1;
    cfg.min_trade_value_cents = 1;
    cfg.order_placement_max_ms = 500;
    cfg.orderbook_fetch_max_ms = 500;
    cfg
}

async fn rig(mode: OperatingMode, cfg: Config) -> TestRig {
    let tmp = std::env::temp_dir()
        .join("cross_venue_arb_it")
        .join(uuid::Uuid::new_v4().to_string());

    let records = Arc::new(RecordSink::new(tmp.join("records")).unwrap());
    let state = Arc::new(StateStore::load(tmp.join("state.json"), 5));
    let alerter: Arc<dyn Alerter> = Arc::new(LogAlerter);
    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::from_config(&cfg),
        state.clone(),
        alerter.clone(),
    ));
    let matcher = Arc::new(EventMatcher::new(MatcherConfig::from_config(&cfg)));
    let books = Arc::new(BookCache::new());
    let detector = Arc::new(ArbitrageDetector::new(DetectorParams::from_config(&cfg)));
    let risk = Arc::new(RiskManager::new(RiskLimits::from_config(&cfg)));
    let mode_flag = Arc::new(ModeFlag::new(mode));

    let v1 = SimVenue::new(Venue::V1);
    let v2 = SimVenue::new(Venue::V2);
    let v1_dyn: Arc<dyn VenueAdapter> = v1.clone();
    let v2_dyn: Arc<dyn VenueAdapter> = v2.clone();

    let engine = Arc::new(ExecutionEngine::new(
        &cfg,
        mode_flag.clone(),
        v1_dyn.clone(),
        v2_dyn.clone(),
        detector.clone(),
        risk.clone(),
        state.clone(),
        breaker.clone(),
        records.clone(),
        alerter.clone(),
        books.clone(),
    ));

    let services = Arc::new(Services {
        config: cfg,
        mode: mode_flag,
        v1: v1_dyn,
        v2: v2_dyn,
        books,
        matcher,
        detector,
        risk,
        state,
        breaker,
        records,
        alerter,
        engine,
        health: VenueHealth::default(),
        scan_gate: AtomicBool::new(true),
    });

    TestRig {
        services,
        v1,
        v2,
        tmp,
    }
}

/// Register the standard mapped market and set crossed books:
/// v1 40/42, v2 50/52, 100 deep everywhere.
async fn seed_crossed_market(rig: &TestRig) -> String {
    let mapping = rig
        .services
        .matcher
        .add_manual("v1-c", "v2-c", "scenario market")
        .await
        .unwrap();
    let ts = Utc::now().timestamp_millis() as u64;
    rig.v1.set_book("v1-c", OrderBook::top(40, 100, 42, 100, ts)).await;
    rig.v2.set_book("v2-c", OrderBook::top(50, 100, 52, 100, ts)).await;
    mapping.id
}

#[tokio::test]
async fn scan_detects_and_executes_dry_run() {
    let rig = rig(OperatingMode::DryRun, scenario_config()).await;
    let mapping_id = seed_crossed_market(&rig).await;

    let summary = scan_once(&rig.services).await;
    assert_eq!(summary.mappings_scanned, 1);
    assert_eq!(summary.opportunities_found, 1);
    assert_eq!(summary.executions_attempted, 1);
    assert_eq!(summary.executions_filled, 1);

    // Detection cached the opportunity for the operator surface.
    let cached = rig
        .services
        .detector
        .last_opportunity(&mapping_id, Utc::now())
        .await
        .expect("cached opportunity");
    assert_eq!(cached.buy_venue, Venue::V1);
    assert_eq!(cached.buy_price, 42);
    assert_eq!(cached.sell_venue, Venue::V2);
    assert_eq!(cached.sell_price, 50);
    assert_eq!(cached.gross_spread_cents, 8);
    assert_eq!(cached.max_qty, 100);

    // Dry run: no venue orders, but a flagged record and hypothetical P&L.
    assert_eq!(rig.v1.placed_order_count().await, 0);
    assert_eq!(rig.v2.placed_order_count().await, 0);
    let recs = rig.services.records.load_executions();
    assert_eq!(recs.len(), 1);
    assert!(recs[0].is_dry_run);
    assert!(rig.services.state.current().await.daily_pnl_cents > 0);
    rig.cleanup();
}

#[tokio::test]
async fn scan_finds_nothing_below_threshold() {
    // v1 ask 48 vs v2 bid 49: spread below fees + threshold.
    let rig = rig(OperatingMode::DryRun, scenario_config()).await;
    rig.services
        .matcher
        .add_manual("v1-c", "v2-c", "tight market")
        .await
        .unwrap();
    let ts = Utc::now().timestamp_millis() as u64;
    rig.v1.set_book("v1-c", OrderBook::top(46, 100, 48, 100, ts)).await;
    rig.v2.set_book("v2-c", OrderBook::top(49, 100, 51, 100, ts)).await;

    let summary = scan_once(&rig.services).await;
    assert_eq!(summary.mappings_scanned, 1);
    assert_eq!(summary.opportunities_found, 0);
    assert_eq!(summary.executions_attempted, 0);
    rig.cleanup();
}

#[tokio::test]
async fn scan_rejects_thin_books() {
    // Happy-path prices but only 10 contracts of depth (< 50 floor).
    let rig = rig(OperatingMode::DryRun, scenario_config()).await;
    rig.services
        .matcher
        .add_manual("v1-c", "v2-c", "thin market")
        .await
        .unwrap();
    let ts = Utc::now().timestamp_millis() as u64;
    rig.v1.set_book("v1-c", OrderBook::top(40, 10, 42, 10, ts)).await;
    rig.v2.set_book("v2-c", OrderBook::top(50, 10, 52, 10, ts)).await;

    let summary = scan_once(&rig.services).await;
    assert_eq!(summary.opportunities_found, 0);
    rig.cleanup();
}

#[tokio::test]
async fn live_asymmetric_fill_pauses_everything() {
    let rig = rig(OperatingMode::Live, scenario_config()).await;
    seed_crossed_market(&rig).await;

    // The sell venue pulls liquidity between detection and fire.
    rig.v2
        .force_next_fill(FillResult::Rejected {
            reason: "liquidity pulled".into(),
            order_id: None,
        })
        .await;

    let summary = scan_once(&rig.services).await;
    assert_eq!(summary.executions_attempted, 1);
    assert_eq!(summary.executions_filled, 0);

    // Breaker paused with the asymmetric reason, unhedged leg surfaced.
    assert!(rig.services.breaker.is_paused());
    assert_eq!(
        rig.services.breaker.status().await.reason.as_deref(),
        Some("asymmetric_execution")
    );
    let positions = rig.services.state.positions().await;
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].venue, Venue::V1);

    let recs = rig.services.records.load_executions();
    assert_eq!(recs.len(), 1);
    assert_eq!(recs[0].status, ExecutionStatus::Failed);

    // And the next scan refuses to execute while paused.
    let ts = Utc::now().timestamp_millis() as u64 + 10;
    rig.v1.set_book("v1-c", OrderBook::top(40, 100, 42, 100, ts)).await;
    rig.v2.set_book("v2-c", OrderBook::top(50, 100, 52, 100, ts)).await;
    let summary = scan_once(&rig.services).await;
    assert_eq!(summary.executions_attempted, 0);
    // Detection still runs for observability.
    assert_eq!(summary.opportunities_found, 1);
    rig.cleanup();
}

#[tokio::test]
async fn live_clean_fill_books_both_legs() {
    let rig = rig(OperatingMode::Live, scenario_config()).await;
    seed_crossed_market(&rig).await;

    let summary = scan_once(&rig.services).await;
    assert_eq!(summary.executions_filled, 1);

    let state = rig.services.state.current().await;
    assert_eq!(state.positions.len(), 2);
    assert_eq!(state.daily_trade_count, 1);
    assert!(state.daily_pnl_cents > 0);
    assert!(!rig.services.state.has_unhedged_positions().await);

    // Ledger and canonical set agree at quiescence.
    let ledger_exposure = rig.services.risk.total_exposure_cents().await;
    let canonical_exposure: i64 = state
        .positions
        .iter()
        .map(|p| p.qty * p.avg_price_cents)
        .sum();
    assert_eq!(ledger_exposure, canonical_exposure);
    rig.cleanup();
}

#[tokio::test]
async fn state_survives_restart() {
    let tmp;
    {
        let rig = rig(OperatingMode::Live, scenario_config()).await;
        tmp = rig.tmp.clone();
        seed_crossed_market(&rig).await;
        scan_once(&rig.services).await;
        rig.services.state.snapshot().await.unwrap();
    }

    // A fresh process loads the same positions and counters.
    let reloaded = StateStore::load(tmp.join("state.json"), 5);
    let state = reloaded.current().await;
    assert_eq!(state.positions.len(), 2);
    assert_eq!(state.daily_trade_count, 1);

    let _ = std::fs::remove_dir_all(&tmp);
}

#[tokio::test]
async fn startup_gate_holds_after_asymmetric_crash() {
    let tmp;
    {
        let rig = rig(OperatingMode::Live, scenario_config()).await;
        tmp = rig.tmp.clone();
        seed_crossed_market(&rig).await;
        rig.v2
            .force_next_fill(FillResult::Rejected {
                reason: "pulled".into(),
                order_id: None,
            })
            .await;
        scan_once(&rig.services).await;
        assert!(rig.services.breaker.is_paused());
    }

    // "Restart": rebuild services over the persisted state.
    let cfg = scenario_config();
    let state = Arc::new(StateStore::load(tmp.join("state.json"), 5));
    let alerter: Arc<dyn Alerter> = Arc::new(LogAlerter);
    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::from_config(&cfg),
        state.clone(),
        alerter.clone(),
    ));
    breaker.restore(&state.cb_state().await).await;

    let books = Arc::new(BookCache::new());
    let detector = Arc::new(ArbitrageDetector::new(DetectorParams::from_config(&cfg)));
    let risk = Arc::new(RiskManager::new(RiskLimits::from_config(&cfg)));
    let matcher = Arc::new(EventMatcher::new(MatcherConfig::from_config(&cfg)));
    let mode_flag = Arc::new(ModeFlag::new(OperatingMode::Live));
    let v1 = SimVenue::new(Venue::V1);
    let v2 = SimVenue::new(Venue::V2);
    let v1_dyn: Arc<dyn VenueAdapter> = v1;
    let v2_dyn: Arc<dyn VenueAdapter> = v2;
    let records = Arc::new(RecordSink::new(tmp.join("records")).unwrap());
    let engine = Arc::new(ExecutionEngine::new(
        &cfg,
        mode_flag.clone(),
        v1_dyn.clone(),
        v2_dyn.clone(),
        detector.clone(),
        risk.clone(),
        state.clone(),
        breaker.clone(),
        records.clone(),
        alerter.clone(),
        books.clone(),
    ));
    let services = Services {
        config: cfg,
        mode: mode_flag,
        v1: v1_dyn,
        v2: v2_dyn,
        books,
        matcher,
        detector,
        risk,
        state,
        breaker,
        records,
        alerter,
        engine,
        health: VenueHealth::default(),
        scan_gate: AtomicBool::new(false),
    };

    let reasons = startup_gate(&services).await;
    // Paused breaker AND an unhedged position both hold the gate.
    assert!(reasons.iter().any(|r| r.contains("circuit breaker")));
    assert!(reasons.iter().any(|r| r.contains("hedge")));

    let _ = std::fs::remove_dir_all(&tmp);
}

#[tokio::test]
async fn rate_limited_venue_throttles_without_pausing() {
    let rig = rig(OperatingMode::DryRun, scenario_config()).await;
    seed_crossed_market(&rig).await;

    rig.v1
        .fail_next_book_read(cross_venue_arb::error::VenueError::RateLimited(
            "429".into(),
        ))
        .await;

    let summary = scan_once(&rig.services).await;
    assert!(summary.rate_limited);
    assert_eq!(summary.opportunities_found, 0);
    assert!(!rig.services.breaker.is_paused());
    rig.cleanup();
}

#[tokio::test]
async fn unauthorized_venue_is_disabled() {
    let rig = rig(OperatingMode::DryRun, scenario_config()).await;
    seed_crossed_market(&rig).await;

    rig.v1
        .fail_next_book_read(cross_venue_arb::error::VenueError::Unauthorized(
            "key revoked".into(),
        ))
        .await;

    let summary = scan_once(&rig.services).await;
    assert_eq!(summary.opportunities_found, 0);
    assert!(rig.services.health.is_disabled(Venue::V1));

    // Later scans skip the disabled venue entirely.
    let summary = scan_once(&rig.services).await;
    assert_eq!(summary.opportunities_found, 0);
    rig.cleanup();
}

#[tokio::test]
async fn daily_loss_limit_trips_the_breaker() {
    let mut cfg = scenario_config();
    cfg.daily_loss_limit_cents = 100;
    let rig = rig(OperatingMode::DryRun, cfg).await;

    // A realized loss beyond the limit (e.g. a settled position) followed
    // by any scan pass must pause the engine.
    rig.services.state.record_trade(-150, 10).await;
    let summary = scan_once(&rig.services).await;
    assert_eq!(summary.mappings_scanned, 0);
    assert!(rig.services.breaker.is_paused());
    assert_eq!(
        rig.services.breaker.status().await.reason.as_deref(),
        Some("daily_loss_limit")
    );
    rig.cleanup();
}

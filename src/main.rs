//! Composition root for the cross-venue arbitrage engine.
//!
//! Builds every component once, wires them by shared handle, spawns the
//! long-lived tasks (scan loop, state autosave, per-venue book feeds,
//! operator shell) and owns graceful shutdown. There are no process-wide
//! singletons: teardown is deterministic because everything lives here.

use anyhow::{Context, Result};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, info_span, warn};

use cross_venue_arb::adapters::sim::SimVenue;
use cross_venue_arb::alert::MultiAlerter;
use cross_venue_arb::books::BookCache;
use cross_venue_arb::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig};
use cross_venue_arb::cli;
use cross_venue_arb::config::Config;
use cross_venue_arb::detector::{ArbitrageDetector, DetectorParams};
use cross_venue_arb::execution::{ExecutionEngine, ModeFlag};
use cross_venue_arb::feed::{run_book_feed, FeedPolicy};
use cross_venue_arb::logging;
use cross_venue_arb::matcher::{EventMatcher, MatcherConfig};
use cross_venue_arb::records::RecordSink;
use cross_venue_arb::risk::{RiskLimits, RiskManager};
use cross_venue_arb::state::StateStore;
use cross_venue_arb::supervisor::{
    run_autosave, run_scan_loop, startup_gate, Services, VenueHealth,
};
use cross_venue_arb::types::{OrderBook, Venue};
use cross_venue_arb::venue::VenueAdapter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = logging::init();
    let run_id = logging::run_id();

    let root_span = info_span!("arb_engine", run_id = %run_id);
    let _enter = root_span.enter();

    let config = Config::from_env();
    let warnings = config.validate();
    for w in &warnings {
        warn!("config: {}", w);
    }

    info!("Cross-venue arbitrage engine starting");
    info!("   mode: {}", config.operating_mode);
    info!(
        "   profit floor: {}bps, slippage envelope: {}bps",
        config.min_profit_threshold_bps, config.max_slippage_bps
    );
    info!(
        "   exposure caps: total {}c, per event {}c, daily loss {}c",
        config.max_total_exposure_cents,
        config.max_exposure_per_event_cents,
        config.daily_loss_limit_cents
    );

    // --- durable state and side-effect sinks ---------------------------
    let records = Arc::new(
        RecordSink::new(&config.records_dir)
            .with_context(|| format!("cannot open record sink at {}", config.records_dir))?,
    );
    let state = Arc::new(StateStore::load(
        &config.state_file_path,
        config.state_failure_escalation,
    ));
    let alerter = MultiAlerter::from_config(&config);

    let breaker = Arc::new(CircuitBreaker::new(
        CircuitBreakerConfig::from_config(&config),
        state.clone(),
        alerter.clone(),
    ));
    breaker.restore(&state.cb_state().await).await;

    // --- core components ------------------------------------------------
    let matcher = Arc::new(EventMatcher::new(MatcherConfig::from_config(&config)));
    matcher.hydrate(records.load_mappings()).await;

    let books = Arc::new(BookCache::new());
    let detector = Arc::new(ArbitrageDetector::new(DetectorParams::from_config(&config)));
    let risk = Arc::new(RiskManager::new(RiskLimits::from_config(&config)));
    // The derived ledger starts equal to the canonical set.
    risk.reconcile(state.positions().await).await;

    let mode = Arc::new(ModeFlag::new(config.operating_mode));

    // --- venue adapters --------------------------------------------------
    // Production deployments replace these with their real venue clients;
    // the reference in-memory backend keeps the whole engine drivable from
    // the shell (and is what the integration suite runs against).
    let v1_sim = SimVenue::new(Venue::V1);
    let v2_sim = SimVenue::new(Venue::V2);
    if std::env::var("SIM_SEED").map(|v| v == "1").unwrap_or(false) {
        seed_reference_market(&matcher, &v1_sim, &v2_sim, &records).await;
    }
    let v1: Arc<dyn VenueAdapter> = v1_sim;
    let v2: Arc<dyn VenueAdapter> = v2_sim;

    let engine = Arc::new(ExecutionEngine::new(
        &config,
        mode.clone(),
        v1.clone(),
        v2.clone(),
        detector.clone(),
        risk.clone(),
        state.clone(),
        breaker.clone(),
        records.clone(),
        alerter.clone(),
        books.clone(),
    ));

    let services = Arc::new(Services {
        config,
        mode,
        v1,
        v2,
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
    });

    // --- crash-recovery gate --------------------------------------------
    let gate_reasons = startup_gate(&services).await;
    if gate_reasons.is_empty() {
        services
            .scan_gate
            .store(true, std::sync::atomic::Ordering::Release);
        info!("Recovery gate clear, scan loop will run");
    } else {
        for reason in &gate_reasons {
            warn!("recovery gate: {}", reason);
        }
        warn!("Scan loop held back; review and issue 'resume' in the shell");
    }

    // --- tasks ------------------------------------------------------------
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let autosave = tokio::spawn(run_autosave(services.clone(), shutdown_rx.clone()));

    let mut feeds = Vec::new();
    for venue in [Venue::V1, Venue::V2] {
        let contracts: Vec<String> = services
            .matcher
            .active_mappings()
            .await
            .into_iter()
            .map(|m| match venue {
                Venue::V1 => m.v1_contract,
                Venue::V2 => m.v2_contract,
            })
            .collect();
        if contracts.is_empty() {
            continue;
        }
        feeds.push(tokio::spawn(run_book_feed(
            services.adapter(venue).clone(),
            contracts,
            services.books.clone(),
            services.breaker.clone(),
            FeedPolicy::from_config(&services.config),
            shutdown_rx.clone(),
        )));
    }

    let scan = tokio::spawn(run_scan_loop(services.clone(), shutdown_rx.clone()));

    let shell = tokio::spawn(cli::run_shell(services.clone(), shutdown_tx.clone()));

    info!("All tasks running; engine operational");

    // --- shutdown ---------------------------------------------------------
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupt received, shutting down");
            let _ = shutdown_tx.send(true);
        }
        _ = shutdown_watch(shutdown_rx.clone()) => {
            // `quit` from the shell.
        }
    }

    // Scan loop finishes any in-flight execution before exiting; give it a
    // bounded window rather than aborting mid-fire.
    let drain = Duration::from_millis(services.config.end_to_end_max_ms + 3_000);
    if tokio::time::timeout(drain, scan).await.is_err() {
        error!("Scan loop did not drain within {}ms", drain.as_millis());
    }
    // Autosave writes the final snapshot on its way out.
    if tokio::time::timeout(Duration::from_secs(5), autosave).await.is_err() {
        error!("Autosave task did not stop cleanly");
    }
    for feed in feeds {
        feed.abort();
    }
    shell.abort();

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_watch(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

/// Seed a demo mapping with crossed books on the reference backend so a
/// dry-run session has something to scan (`SIM_SEED=1`).
async fn seed_reference_market(
    matcher: &Arc<EventMatcher>,
    v1: &Arc<SimVenue>,
    v2: &Arc<SimVenue>,
    records: &Arc<RecordSink>,
) {
    let Some(mapping) = matcher
        .add_manual(
            "v1-demo-contract",
            "v2-demo-contract",
            "reference backend demo market",
        )
        .await
    else {
        return;
    };
    records.record_mapping(&mapping);

    let now_ms = chrono::Utc::now().timestamp_millis() as u64;
    v1.set_book(
        "v1-demo-contract",
        OrderBook::top(40, 100, 42, 100, now_ms),
    )
    .await;
    v2.set_book(
        "v2-demo-contract",
        OrderBook::top(50, 100, 52, 100, now_ms),
    )
    .await;
    info!("Seeded reference demo market ({} mapping)", mapping.id);
}

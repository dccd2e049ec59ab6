//! Supervisor: the periodic scan loop and the process-level policies that
//! surround it (crash-recovery gate, daily-loss tripwire, state autosave).
//!
//! The scan loop is the only caller of the execution engine in normal
//! operation. It finishes whatever execution it has started before
//! honoring a shutdown signal; a half-fired two-leg trade is exactly the
//! failure mode this system exists to avoid.

use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::alert::{Alerter, Severity};
use crate::books::BookCache;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::Config;
use crate::detector::ArbitrageDetector;
use crate::error::{FailureKind, VenueError};
use crate::execution::{ExecutionEngine, ExecutionOutcome, ModeFlag};
use crate::matcher::{EventMapping, EventMatcher};
use crate::records::RecordSink;
use crate::retry::{retry_venue_call, RetryPolicy};
use crate::risk::RiskManager;
use crate::state::StateStore;
use crate::types::Venue;
use crate::venue::VenueAdapter;

/// Per-venue availability flags (a venue is disabled on credential failure
/// until operator action).
#[derive(Default)]
pub struct VenueHealth {
    v1_disabled: AtomicBool,
    v2_disabled: AtomicBool,
}

impl VenueHealth {
    pub fn is_disabled(&self, venue: Venue) -> bool {
        match venue {
            Venue::V1 => self.v1_disabled.load(Ordering::Acquire),
            Venue::V2 => self.v2_disabled.load(Ordering::Acquire),
        }
    }

    pub fn set_disabled(&self, venue: Venue, disabled: bool) {
        let flag = match venue {
            Venue::V1 => &self.v1_disabled,
            Venue::V2 => &self.v2_disabled,
        };
        flag.store(disabled, Ordering::Release);
    }
}

/// Every long-lived component, built once at startup and shared by handle.
pub struct Services {
    pub config: Config,
    pub mode: Arc<ModeFlag>,
    pub v1: Arc<dyn VenueAdapter>,
    pub v2: Arc<dyn VenueAdapter>,
    pub books: Arc<BookCache>,
    pub matcher: Arc<EventMatcher>,
    pub detector: Arc<ArbitrageDetector>,
    pub risk: Arc<RiskManager>,
    pub state: Arc<StateStore>,
    pub breaker: Arc<CircuitBreaker>,
    pub records: Arc<RecordSink>,
    pub alerter: Arc<dyn Alerter>,
    pub engine: Arc<ExecutionEngine>,
    pub health: VenueHealth,
    /// Closed when the crash-recovery gate held back auto-start; the
    /// operator's `resume` opens it.
    pub scan_gate: AtomicBool,
}

impl Services {
    pub fn adapter(&self, venue: Venue) -> &Arc<dyn VenueAdapter> {
        match venue {
            Venue::V1 => &self.v1,
            Venue::V2 => &self.v2,
        }
    }
}

/// Result of one pass over the active mappings.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ScanSummary {
    pub mappings_scanned: usize,
    pub opportunities_found: usize,
    pub executions_attempted: usize,
    pub executions_filled: usize,
    pub rate_limited: bool,
}

/// Reasons the scan loop must not start without operator review.
///
/// A stale snapshot, a persisted pause, or positions missing their hedge
/// all mean the last session did not end cleanly; the operator issues
/// `resume` once satisfied. This gate is policy; do not weaken it.
pub async fn startup_gate(services: &Services) -> Vec<String> {
    let mut reasons = Vec::new();
    let now = chrono::Utc::now();

    let age = services.state.state_age_minutes(now).await;
    if age > services.config.max_state_age_minutes {
        reasons.push(format!(
            "state snapshot is {}min old (max {}min)",
            age, services.config.max_state_age_minutes
        ));
    }

    if services.breaker.is_paused() {
        let status = services.breaker.status().await;
        reasons.push(format!(
            "circuit breaker paused: {}",
            status.reason.unwrap_or_else(|| "unknown".into())
        ));
    }

    if services.state.has_unhedged_positions().await {
        reasons.push("open positions without matching hedges".to_string());
    }

    if services.config.require_manual_review {
        for w in services.config.validate() {
            reasons.push(format!("config warning: {}", w));
        }
    }

    reasons
}

/// One pass: scan every tradable mapping, detect, validate, execute.
pub async fn scan_once(services: &Services) -> ScanSummary {
    let mut summary = ScanSummary::default();
    let now = chrono::Utc::now();
    let paused = services.breaker.is_paused();

    if paused && !services.config.detect_while_paused {
        return summary;
    }

    let mappings = services.matcher.active_mappings().await;
    for mapping in &mappings {
        if !services.matcher.can_trade(mapping) {
            continue;
        }
        summary.mappings_scanned += 1;

        let Some((v1_book, v2_book)) = fetch_books(services, mapping, &mut summary).await else {
            continue;
        };

        services
            .books
            .update(Venue::V1, &mapping.v1_contract, v1_book.clone())
            .await;
        services
            .books
            .update(Venue::V2, &mapping.v2_contract, v2_book.clone())
            .await;

        let Some(opportunity) = services
            .detector
            .detect(mapping, &v1_book, &v2_book, now)
            .await
        else {
            continue;
        };
        summary.opportunities_found += 1;
        services.records.record_opportunity(&opportunity);
        info!(
            event = "opportunity_detected",
            mapping_id = %mapping.id,
            buy_venue = %opportunity.buy_venue,
            buy_price = opportunity.buy_price,
            sell_venue = %opportunity.sell_venue,
            sell_price = opportunity.sell_price,
            net_total_cents = opportunity.net_total_cents,
            max_qty = opportunity.max_qty,
            "Opportunity"
        );

        if paused {
            continue;
        }

        let qty = services.risk.optimal_qty(&opportunity).await;
        summary.executions_attempted += 1;
        match services.engine.execute(mapping, &opportunity, qty).await {
            ExecutionOutcome::BothFilled { .. } => summary.executions_filled += 1,
            ExecutionOutcome::Asymmetric { .. } => {
                // The breaker is paused now; stop touching the venues.
                break;
            }
            _ => {}
        }
    }

    // Daily-loss tripwire: the risk validator rejects trades past the
    // limit, this converts the condition into a hard pause.
    let state = services.state.current().await;
    if state.daily_pnl_cents < -services.config.daily_loss_limit_cents
        && !services.breaker.is_paused()
    {
        services
            .breaker
            .record_failure(FailureKind::DailyLossLimit)
            .await;
    }

    services.detector.clear_expired(chrono::Utc::now()).await;
    summary
}

/// Pull both books for a mapping through the bounded-retry read policy.
async fn fetch_books(
    services: &Services,
    mapping: &EventMapping,
    summary: &mut ScanSummary,
) -> Option<(crate::types::OrderBook, crate::types::OrderBook)> {
    let v1_book = fetch_one(services, Venue::V1, &mapping.v1_contract, summary).await?;
    let v2_book = fetch_one(services, Venue::V2, &mapping.v2_contract, summary).await?;
    Some((v1_book, v2_book))
}

async fn fetch_one(
    services: &Services,
    venue: Venue,
    contract: &str,
    summary: &mut ScanSummary,
) -> Option<crate::types::OrderBook> {
    if services.health.is_disabled(venue) {
        return None;
    }
    let adapter = services.adapter(venue);
    let deadline = std::time::Duration::from_millis(services.config.orderbook_fetch_max_ms);
    let result = retry_venue_call(&RetryPolicy::reads(), "order_book", || async {
        match tokio::time::timeout(deadline, adapter.get_order_book(contract)).await {
            Ok(res) => res,
            Err(_) => Err(VenueError::Transient("order book fetch timed out".into())),
        }
    })
    .await;

    match result {
        Ok(book) => Some(book),
        Err(VenueError::RateLimited(detail)) => {
            summary.rate_limited = true;
            services
                .breaker
                .record_failure(FailureKind::RateLimitExceeded)
                .await;
            warn!("{}: rate limited fetching {}: {}", venue, contract, detail);
            None
        }
        Err(VenueError::Unauthorized(detail)) => {
            services.health.set_disabled(venue, true);
            error!("{}: credentials rejected, venue disabled: {}", venue, detail);
            services
                .alerter
                .send(
                    Severity::High,
                    "venue_disabled",
                    &format!("{} disabled on credential failure: {}", venue, detail),
                )
                .await;
            None
        }
        Err(e) => {
            warn!("{}: book fetch for {} failed: {}", venue, contract, e);
            None
        }
    }
}

/// The periodic scan task. Hard rate limits stretch the interval by the
/// configured throttle for one cycle.
pub async fn run_scan_loop(services: Arc<Services>, mut shutdown: watch::Receiver<bool>) {
    let base_interval = services.config.scan_interval();
    info!(
        event = "scan_loop_started",
        interval_ms = base_interval.as_millis() as u64,
        mode = %services.mode.get(),
        "Scan loop running"
    );

    let mut next_interval = base_interval;
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("Scan loop stopping");
                    return;
                }
            }
            _ = tokio::time::sleep(next_interval) => {
                if !services.scan_gate.load(Ordering::Acquire) {
                    continue;
                }
                // Work inside the arm: a shutdown signal arriving mid-scan
                // waits for the pass (and any in-flight execution) to finish
                // classification.
                let summary = scan_once(&services).await;
                next_interval = if summary.rate_limited {
                    base_interval * services.config.rate_limit_throttle.max(1)
                } else {
                    base_interval
                };
            }
        }
    }
}

/// The snapshot task: periodic saves, escalation after repeated failures,
/// one final snapshot on shutdown.
pub async fn run_autosave(services: Arc<Services>, mut shutdown: watch::Receiver<bool>) {
    let interval = std::time::Duration::from_secs(services.config.auto_save_interval_s.max(1));
    let mut escalated = false;

    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    if let Err(e) = services.state.snapshot().await {
                        error!("Final snapshot on shutdown failed: {}", e);
                    } else {
                        info!("Final state snapshot written");
                    }
                    return;
                }
            }
            _ = tokio::time::sleep(interval) => {
                let _ = services.state.snapshot().await;
                if services.state.io_failures_exceeded() && !escalated {
                    escalated = true;
                    services
                        .breaker
                        .record_failure(FailureKind::StateUnrecoverable)
                        .await;
                }
            }
        }
    }
}

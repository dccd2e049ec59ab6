//! Two-leg fill-or-kill execution with atomicity discipline.
//!
//! One execution attempt walks validate -> revalidate -> fire -> classify.
//! Both legs are submitted concurrently and BOTH outcomes are always
//! awaited; the engine never returns early from a fire. A `Rejected` leg is
//! known-flat, a `TransportError` leg is a potential fill until reconciled
//! against venue positions, and any confirmed one-sided fill pauses the
//! breaker and waits for a human; there is no automatic unwind.
//!
//! Every attempt, whatever its outcome, produces exactly one durable
//! execution record.

use chrono::Utc;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::alert::{Alerter, Severity};
use crate::books::BookCache;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::{Config, OperatingMode};
use crate::detector::ArbitrageDetector;
use crate::error::FailureKind;
use crate::matcher::EventMapping;
use crate::records::{ExecutionRecord, ExecutionStatus, LegRecord, RecordSink};
use crate::risk::{RiskContext, RiskManager};
use crate::state::{opposite_side, StateStore};
use crate::types::{ContractSide, Opportunity, OrderSide, Position, Qty, Venue};
use crate::venue::{FillResult, FokOrder, VenueAdapter};

/// Runtime-switchable operating mode (the CLI flips it live).
pub struct ModeFlag {
    live: AtomicBool,
}

impl ModeFlag {
    pub fn new(mode: OperatingMode) -> Self {
        Self {
            live: AtomicBool::new(mode == OperatingMode::Live),
        }
    }

    pub fn get(&self) -> OperatingMode {
        if self.live.load(Ordering::Acquire) {
            OperatingMode::Live
        } else {
            OperatingMode::DryRun
        }
    }

    pub fn set(&self, mode: OperatingMode) {
        self.live
            .store(mode == OperatingMode::Live, Ordering::Release);
    }
}

/// Classified terminal outcome of one attempt.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    /// Rejected before firing (risk, breaker, staleness, spread gone).
    NotExecuted { reason: String },
    /// Both legs rejected by their venues; nothing rests anywhere.
    BothRejected,
    /// Clean two-leg fill.
    BothFilled {
        qty: Qty,
        realized_pnl_cents: i64,
        is_dry_run: bool,
    },
    /// One leg (possibly) filled without its hedge. Breaker is paused.
    Asymmetric { detail: String },
}

/// Engine timing/slippage knobs.
#[derive(Debug, Clone)]
struct EngineParams {
    max_slippage_bps: u32,
    order_placement_max_ms: u64,
    end_to_end_max_ms: u64,
    orderbook_fetch_max_ms: u64,
    reconcile_timeout_ms: u64,
}

pub struct ExecutionEngine {
    params: EngineParams,
    mode: Arc<ModeFlag>,
    v1: Arc<dyn VenueAdapter>,
    v2: Arc<dyn VenueAdapter>,
    detector: Arc<ArbitrageDetector>,
    risk: Arc<RiskManager>,
    state: Arc<StateStore>,
    breaker: Arc<CircuitBreaker>,
    records: Arc<RecordSink>,
    alerter: Arc<dyn Alerter>,
    books: Arc<BookCache>,
    /// One mutex per mapping id: executions per mapping are strictly
    /// serialized, detection is not.
    mapping_locks: Mutex<FxHashMap<String, Arc<Mutex<()>>>>,
}

#[allow(clippy::too_many_arguments)]
impl ExecutionEngine {
    pub fn new(
        cfg: &Config,
        mode: Arc<ModeFlag>,
        v1: Arc<dyn VenueAdapter>,
        v2: Arc<dyn VenueAdapter>,
        detector: Arc<ArbitrageDetector>,
        risk: Arc<RiskManager>,
        state: Arc<StateStore>,
        breaker: Arc<CircuitBreaker>,
        records: Arc<RecordSink>,
        alerter: Arc<dyn Alerter>,
        books: Arc<BookCache>,
    ) -> Self {
        Self {
            params: EngineParams {
                max_slippage_bps: cfg.max_slippage_bps,
                order_placement_max_ms: cfg.order_placement_max_ms,
                end_to_end_max_ms: cfg.end_to_end_max_ms,
                orderbook_fetch_max_ms: cfg.orderbook_fetch_max_ms,
                reconcile_timeout_ms: cfg.reconcile_timeout_ms,
            },
            mode,
            v1,
            v2,
            detector,
            risk,
            state,
            breaker,
            records,
            alerter,
            books,
            mapping_locks: Mutex::new(FxHashMap::default()),
        }
    }

    fn adapter(&self, venue: Venue) -> &Arc<dyn VenueAdapter> {
        match venue {
            Venue::V1 => &self.v1,
            Venue::V2 => &self.v2,
        }
    }

    async fn lock_for(&self, mapping_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.mapping_locks.lock().await;
        locks
            .entry(mapping_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Execute an opportunity end to end. Holds the per-mapping lock for the
    /// whole attempt.
    pub async fn execute(
        &self,
        mapping: &EventMapping,
        opportunity: &Opportunity,
        proposed_qty: Qty,
    ) -> ExecutionOutcome {
        let lock = self.lock_for(&mapping.id).await;
        let _guard = lock.lock().await;
        let started = Instant::now();

        // --- 1. Validate ------------------------------------------------
        let now = Utc::now();
        if opportunity.is_expired(now) {
            return self
                .finish_not_executed(opportunity, "opportunity expired", started)
                .await;
        }

        let daily = self.state.current().await;
        let decision = self
            .risk
            .validate(
                opportunity,
                proposed_qty,
                RiskContext {
                    cb_paused: self.breaker.is_paused(),
                    daily_pnl_cents: daily.daily_pnl_cents,
                },
            )
            .await;
        for w in &decision.warnings {
            warn!(event = "risk_warning", mapping_id = %mapping.id, "{}", w);
        }
        if !decision.approved {
            let reason = decision.reasons.join("; ");
            return self.finish_not_executed(opportunity, &reason, started).await;
        }
        let final_qty = decision.suggested_qty.unwrap_or(proposed_qty);

        // --- 2. Revalidate (one retry allowed on pre-fire errors) -------
        let fresh = match self.revalidate(mapping, opportunity).await {
            Ok(Some(fresh)) => fresh,
            Ok(None) => {
                return self
                    .finish_not_executed(opportunity, "spread gone on revalidation", started)
                    .await;
            }
            Err(e) => {
                self.breaker.record_failure(FailureKind::ExecutionFailure).await;
                return self
                    .finish_not_executed(opportunity, &format!("revalidation failed: {}", e), started)
                    .await;
            }
        };
        let final_qty = final_qty.min(fresh.max_qty);

        // --- 3. Dry-run short-circuit -----------------------------------
        if self.mode.get() == OperatingMode::DryRun {
            return self.execute_dry_run(opportunity, final_qty, started).await;
        }

        // --- 4. Fire both legs concurrently ------------------------------
        let buy_order = FokOrder {
            contract: contract_for(mapping, opportunity.buy_venue),
            side: OrderSide::Buy,
            price_cents: opportunity.buy_price,
            qty: final_qty,
        };
        let sell_order = FokOrder {
            contract: contract_for(mapping, opportunity.sell_venue),
            side: OrderSide::Sell,
            price_cents: opportunity.sell_price,
            qty: final_qty,
        };

        let placement_deadline = Duration::from_millis(self.params.order_placement_max_ms);
        let buy_adapter = self.adapter(opportunity.buy_venue).clone();
        let sell_adapter = self.adapter(opportunity.sell_venue).clone();

        // Both futures complete before classification; a leg that outlives
        // its placement deadline is a transport ambiguity even if a late
        // response eventually arrives.
        let buy_fut = place_with_deadline(buy_adapter, buy_order, placement_deadline);
        let sell_fut = place_with_deadline(sell_adapter, sell_order, placement_deadline);
        let (buy_result, sell_result) = tokio::join!(buy_fut, sell_fut);

        let elapsed = started.elapsed();
        if elapsed.as_millis() as u64 > self.params.end_to_end_max_ms {
            warn!(
                event = "latency_breach",
                mapping_id = %mapping.id,
                elapsed_ms = elapsed.as_millis() as u64,
                limit_ms = self.params.end_to_end_max_ms,
                "fire-to-result exceeded the end-to-end ceiling"
            );
        }

        // --- 5. Classify --------------------------------------------------
        self.classify(
            mapping,
            opportunity,
            final_qty,
            buy_result,
            sell_result,
            started,
        )
        .await
    }

    /// Refetch both books through the authoritative pull path and re-detect.
    /// `Ok(None)` means the opportunity is no longer valid within the
    /// slippage envelope.
    async fn revalidate(
        &self,
        mapping: &EventMapping,
        prior: &Opportunity,
    ) -> anyhow::Result<Option<Opportunity>> {
        let fetch_deadline = Duration::from_millis(self.params.orderbook_fetch_max_ms);
        let mut attempt = 0;
        let (v1_book, v2_book) = loop {
            attempt += 1;
            let v1_fut = tokio::time::timeout(
                fetch_deadline,
                self.v1.get_order_book(&mapping.v1_contract),
            );
            let v2_fut = tokio::time::timeout(
                fetch_deadline,
                self.v2.get_order_book(&mapping.v2_contract),
            );
            let (v1_res, v2_res) = tokio::join!(v1_fut, v2_fut);
            match (flatten_fetch(v1_res), flatten_fetch(v2_res)) {
                (Ok(a), Ok(b)) => break (a, b),
                (a, b) if attempt >= 2 => {
                    let detail = a.err().or(b.err()).unwrap_or_else(|| "unknown".into());
                    anyhow::bail!("book refetch failed twice: {}", detail);
                }
                _ => continue,
            }
        };

        self.books
            .update(Venue::V1, &mapping.v1_contract, v1_book.clone())
            .await;
        self.books
            .update(Venue::V2, &mapping.v2_contract, v2_book.clone())
            .await;

        let now = Utc::now();
        let Some(fresh) = self.detector.detect(mapping, &v1_book, &v2_book, now).await else {
            return Ok(None);
        };

        // Direction must hold and the per-unit net must stay within the
        // slippage envelope of what was validated:
        //   fresh_net/unit >= prior_net/unit * (1 - slippage)
        if fresh.buy_venue != prior.buy_venue {
            return Ok(None);
        }
        let lhs = fresh.net_total_cents * prior.max_qty * 10_000;
        let rhs =
            prior.net_total_cents * fresh.max_qty * (10_000 - self.params.max_slippage_bps as i64);
        if lhs < rhs {
            info!(
                event = "slippage_abort",
                mapping_id = %mapping.id,
                "revalidated net fell out of the slippage envelope"
            );
            return Ok(None);
        }

        Ok(Some(fresh))
    }

    async fn execute_dry_run(
        &self,
        opportunity: &Opportunity,
        qty: Qty,
        started: Instant,
    ) -> ExecutionOutcome {
        // Synthesize fills at the opportunity prices; never touch a venue.
        let net_at_qty = if opportunity.max_qty > 0 {
            opportunity.net_total_cents * qty / opportunity.max_qty
        } else {
            0
        };
        let fees_at_qty = if opportunity.max_qty > 0 {
            opportunity.est_fees_cents * qty / opportunity.max_qty
        } else {
            0
        };

        self.state.record_trade(net_at_qty, qty * 2).await;

        let record = ExecutionRecord {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            mapping_id: opportunity.mapping_id.clone(),
            opportunity_id: opportunity.id.clone(),
            status: ExecutionStatus::Complete,
            is_dry_run: true,
            buy: LegRecord {
                venue: opportunity.buy_venue,
                price_cents: opportunity.buy_price,
                qty,
                order_id: None,
                outcome: "synthesized".into(),
            },
            sell: LegRecord {
                venue: opportunity.sell_venue,
                price_cents: opportunity.sell_price,
                qty,
                order_id: None,
                outcome: "synthesized".into(),
            },
            realized_pnl_cents: net_at_qty,
            fees_cents: fees_at_qty,
            failure: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        self.records.record_execution(&record);

        info!(
            event = "dry_run_execution",
            mapping_id = %opportunity.mapping_id,
            qty = qty,
            hypothetical_pnl_cents = net_at_qty,
            "Dry run: would have executed"
        );

        ExecutionOutcome::BothFilled {
            qty,
            realized_pnl_cents: net_at_qty,
            is_dry_run: true,
        }
    }

    async fn classify(
        &self,
        mapping: &EventMapping,
        opportunity: &Opportunity,
        qty: Qty,
        buy_result: FillResult,
        sell_result: FillResult,
        started: Instant,
    ) -> ExecutionOutcome {
        use FillResult::*;

        match (&buy_result, &sell_result) {
            (
                Filled {
                    fill_price_cents: buy_px,
                    fill_qty: buy_qty,
                    fees_cents: buy_fees,
                    order_id: buy_id,
                    ..
                },
                Filled {
                    fill_price_cents: sell_px,
                    fill_qty: sell_qty,
                    fees_cents: sell_fees,
                    order_id: sell_id,
                    ..
                },
            ) => {
                // FOK: a fill is all-or-nothing, so both quantities must
                // match the request; anything else is venue misbehavior and
                // handled as asymmetric below.
                if buy_qty != sell_qty {
                    return self
                        .finish_asymmetric(
                            mapping,
                            opportunity,
                            qty,
                            &buy_result,
                            &sell_result,
                            "FOK venues returned unequal fills",
                            started,
                        )
                        .await;
                }
                self.settle_both_filled(
                    mapping,
                    opportunity,
                    *buy_px,
                    *sell_px,
                    *buy_qty,
                    buy_fees + sell_fees,
                    buy_id,
                    sell_id,
                    started,
                )
                .await
            }

            (Rejected { .. }, Rejected { .. }) => {
                // The expected race outcome: someone else took the levels.
                let record = ExecutionRecord {
                    id: Uuid::new_v4().to_string(),
                    ts: Utc::now(),
                    mapping_id: mapping.id.clone(),
                    opportunity_id: opportunity.id.clone(),
                    status: ExecutionStatus::NotExecuted,
                    is_dry_run: false,
                    buy: leg_from_result(opportunity.buy_venue, opportunity.buy_price, qty, &buy_result),
                    sell: leg_from_result(
                        opportunity.sell_venue,
                        opportunity.sell_price,
                        qty,
                        &sell_result,
                    ),
                    realized_pnl_cents: 0,
                    fees_cents: 0,
                    failure: None,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                self.records.record_execution(&record);
                info!(
                    event = "both_rejected",
                    mapping_id = %mapping.id,
                    "Both legs rejected, no position taken"
                );
                ExecutionOutcome::BothRejected
            }

            (TransportError { .. }, TransportError { .. }) => {
                // Double ambiguity: ask both venues what actually rests
                // before declaring disaster.
                match self.reconcile_double_ambiguity(mapping, qty).await {
                    Some((false, false)) => {
                        let record = ExecutionRecord {
                            id: Uuid::new_v4().to_string(),
                            ts: Utc::now(),
                            mapping_id: mapping.id.clone(),
                            opportunity_id: opportunity.id.clone(),
                            status: ExecutionStatus::NotExecuted,
                            is_dry_run: false,
                            buy: leg_from_result(
                                opportunity.buy_venue,
                                opportunity.buy_price,
                                qty,
                                &buy_result,
                            ),
                            sell: leg_from_result(
                                opportunity.sell_venue,
                                opportunity.sell_price,
                                qty,
                                &sell_result,
                            ),
                            realized_pnl_cents: 0,
                            fees_cents: 0,
                            failure: Some("double transport error, reconciled flat".into()),
                            elapsed_ms: started.elapsed().as_millis() as u64,
                        };
                        self.records.record_execution(&record);
                        warn!(
                            event = "reconciled_flat",
                            mapping_id = %mapping.id,
                            "Both legs errored in transport; venues confirm no fills"
                        );
                        ExecutionOutcome::BothRejected
                    }
                    Some((true, true)) => {
                        // Both actually filled; book the trade at the
                        // intended prices with estimated fees.
                        let fees_at_qty = if opportunity.max_qty > 0 {
                            opportunity.est_fees_cents * qty / opportunity.max_qty
                        } else {
                            0
                        };
                        self.settle_both_filled(
                            mapping,
                            opportunity,
                            opportunity.buy_price,
                            opportunity.sell_price,
                            qty,
                            fees_at_qty,
                            "reconciled",
                            "reconciled",
                            started,
                        )
                        .await
                    }
                    _ => {
                        self.finish_asymmetric(
                            mapping,
                            opportunity,
                            qty,
                            &buy_result,
                            &sell_result,
                            "transport ambiguity unresolved within deadline",
                            started,
                        )
                        .await
                    }
                }
            }

            // One leg certain, the other rejected or ambiguous: asymmetric.
            _ => {
                self.finish_asymmetric(
                    mapping,
                    opportunity,
                    qty,
                    &buy_result,
                    &sell_result,
                    "one leg filled or unconfirmed without its hedge",
                    started,
                )
                .await
            }
        }
    }

    /// Book a clean two-leg fill: daily counters, one position per leg,
    /// one `complete` record, breaker success, medium alert.
    #[allow(clippy::too_many_arguments)]
    async fn settle_both_filled(
        &self,
        mapping: &EventMapping,
        opportunity: &Opportunity,
        buy_px: u16,
        sell_px: u16,
        matched: Qty,
        fees: i64,
        buy_order_id: &str,
        sell_order_id: &str,
        started: Instant,
    ) -> ExecutionOutcome {
        let realized = (sell_px as i64 - buy_px as i64) * matched - fees;

        self.state.record_trade(realized, matched * 2).await;

        let buy_pos = position_from_leg(
            mapping,
            opportunity.buy_venue,
            ContractSide::Yes,
            matched,
            buy_px as i64,
        );
        // Selling YES at p leaves us holding the NO side at (1-p).
        let sell_pos = position_from_leg(
            mapping,
            opportunity.sell_venue,
            opposite_side(ContractSide::Yes),
            matched,
            100 - sell_px as i64,
        );
        for pos in [&buy_pos, &sell_pos] {
            self.risk.apply_fill(pos.clone()).await;
            self.state.apply_position(pos.clone()).await;
            self.records.record_position(pos);
        }

        let record = ExecutionRecord {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            mapping_id: mapping.id.clone(),
            opportunity_id: opportunity.id.clone(),
            status: ExecutionStatus::Complete,
            is_dry_run: false,
            buy: LegRecord {
                venue: opportunity.buy_venue,
                price_cents: buy_px,
                qty: matched,
                order_id: Some(buy_order_id.to_string()),
                outcome: "filled".into(),
            },
            sell: LegRecord {
                venue: opportunity.sell_venue,
                price_cents: sell_px,
                qty: matched,
                order_id: Some(sell_order_id.to_string()),
                outcome: "filled".into(),
            },
            realized_pnl_cents: realized,
            fees_cents: fees,
            failure: None,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        self.records.record_execution(&record);
        self.breaker.record_success().await;

        info!(
            event = "trade_executed",
            mapping_id = %mapping.id,
            qty = matched,
            buy_venue = %opportunity.buy_venue,
            sell_venue = %opportunity.sell_venue,
            realized_pnl_cents = realized,
            "Two-leg fill complete"
        );
        self.alerter
            .send(
                Severity::Medium,
                "trade_executed",
                &format!(
                    "{}x {} -> {} for {}c net",
                    matched, opportunity.buy_venue, opportunity.sell_venue, realized
                ),
            )
            .await;

        ExecutionOutcome::BothFilled {
            qty: matched,
            realized_pnl_cents: realized,
            is_dry_run: false,
        }
    }

    /// Query both venues' positions to settle a double transport ambiguity.
    /// Returns (v1_leg_filled, v2_leg_filled), or `None` when the venues
    /// cannot be read within the reconciliation deadline.
    async fn reconcile_double_ambiguity(
        &self,
        mapping: &EventMapping,
        qty: Qty,
    ) -> Option<(bool, bool)> {
        let deadline = Duration::from_millis(self.params.reconcile_timeout_ms);
        let v1_fut = tokio::time::timeout(deadline, self.v1.get_positions());
        let v2_fut = tokio::time::timeout(deadline, self.v2.get_positions());
        let (v1_res, v2_res) = tokio::join!(v1_fut, v2_fut);

        let v1_positions = v1_res.ok()?.ok()?;
        let v2_positions = v2_res.ok()?.ok()?;

        // Known prior holdings make "new fill" detection ambiguous; compare
        // against the canonical set we held before firing.
        let before = self.state.positions().await;
        let newly = |positions: &[Position], venue: Venue, contract: &str| {
            let prior: Qty = before
                .iter()
                .filter(|p| p.venue == venue && p.contract == contract)
                .map(|p| p.qty)
                .sum();
            let now: Qty = positions
                .iter()
                .filter(|p| p.contract == contract)
                .map(|p| p.qty)
                .sum();
            now >= prior + qty
        };

        Some((
            newly(&v1_positions, Venue::V1, &mapping.v1_contract),
            newly(&v2_positions, Venue::V2, &mapping.v2_contract),
        ))
    }

    async fn finish_not_executed(
        &self,
        opportunity: &Opportunity,
        reason: &str,
        started: Instant,
    ) -> ExecutionOutcome {
        let record = ExecutionRecord {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            mapping_id: opportunity.mapping_id.clone(),
            opportunity_id: opportunity.id.clone(),
            status: ExecutionStatus::NotExecuted,
            is_dry_run: self.mode.get() == OperatingMode::DryRun,
            buy: leg_record(
                opportunity.buy_venue,
                opportunity.buy_price,
                0,
                None,
                "not_sent",
            ),
            sell: leg_record(
                opportunity.sell_venue,
                opportunity.sell_price,
                0,
                None,
                "not_sent",
            ),
            realized_pnl_cents: 0,
            fees_cents: 0,
            failure: Some(reason.to_string()),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        self.records.record_execution(&record);
        info!(
            event = "execution_skipped",
            mapping_id = %opportunity.mapping_id,
            reason = reason,
            "Execution not attempted"
        );
        ExecutionOutcome::NotExecuted {
            reason: reason.to_string(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn finish_asymmetric(
        &self,
        mapping: &EventMapping,
        opportunity: &Opportunity,
        qty: Qty,
        buy_result: &FillResult,
        sell_result: &FillResult,
        detail: &str,
        started: Instant,
    ) -> ExecutionOutcome {
        // Record whichever leg is a confirmed fill as an open, unhedged
        // position so the operator sees exactly what is at risk. No
        // automatic unwind: state is surfaced, trading stops.
        if let FillResult::Filled {
            fill_price_cents,
            fill_qty,
            ..
        } = buy_result
        {
            let pos = position_from_leg(
                mapping,
                opportunity.buy_venue,
                ContractSide::Yes,
                *fill_qty,
                *fill_price_cents as i64,
            );
            self.risk.apply_fill(pos.clone()).await;
            self.state.apply_position(pos.clone()).await;
            self.records.record_position(&pos);
        }
        if let FillResult::Filled {
            fill_price_cents,
            fill_qty,
            ..
        } = sell_result
        {
            let pos = position_from_leg(
                mapping,
                opportunity.sell_venue,
                ContractSide::No,
                *fill_qty,
                100 - *fill_price_cents as i64,
            );
            self.risk.apply_fill(pos.clone()).await;
            self.state.apply_position(pos.clone()).await;
            self.records.record_position(&pos);
        }

        let record = ExecutionRecord {
            id: Uuid::new_v4().to_string(),
            ts: Utc::now(),
            mapping_id: mapping.id.clone(),
            opportunity_id: opportunity.id.clone(),
            status: ExecutionStatus::Failed,
            is_dry_run: false,
            buy: leg_from_result(opportunity.buy_venue, opportunity.buy_price, qty, buy_result),
            sell: leg_from_result(
                opportunity.sell_venue,
                opportunity.sell_price,
                qty,
                sell_result,
            ),
            realized_pnl_cents: 0,
            fees_cents: 0,
            failure: Some(format!("asymmetric_execution: {}", detail)),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        self.records.record_execution(&record);

        // The pause happens inside the same classification pass; no window
        // where another execution can slip through unhedged.
        self.breaker
            .record_failure(FailureKind::AsymmetricExecution)
            .await;
        self.alerter
            .send(
                Severity::Critical,
                "asymmetric_execution",
                &format!(
                    "mapping {}: {} (buy={}, sell={})",
                    mapping.id,
                    detail,
                    fill_result_tag(buy_result),
                    fill_result_tag(sell_result)
                ),
            )
            .await;

        ExecutionOutcome::Asymmetric {
            detail: detail.to_string(),
        }
    }
}

/// Place one FOK leg under the placement deadline; a breach becomes a
/// transport ambiguity regardless of what the venue later answers.
async fn place_with_deadline(
    adapter: Arc<dyn VenueAdapter>,
    order: FokOrder,
    deadline: Duration,
) -> FillResult {
    match tokio::time::timeout(deadline, adapter.place_fok(&order)).await {
        Ok(result) => result,
        Err(_) => FillResult::TransportError {
            detail: format!(
                "placement exceeded {}ms on {}",
                deadline.as_millis(),
                adapter.venue()
            ),
        },
    }
}

fn flatten_fetch<T>(
    res: Result<crate::error::VenueResult<T>, tokio::time::error::Elapsed>,
) -> Result<T, String> {
    match res {
        Ok(Ok(v)) => Ok(v),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("fetch deadline exceeded".to_string()),
    }
}

fn contract_for(mapping: &EventMapping, venue: Venue) -> String {
    match venue {
        Venue::V1 => mapping.v1_contract.clone(),
        Venue::V2 => mapping.v2_contract.clone(),
    }
}

fn position_from_leg(
    mapping: &EventMapping,
    venue: Venue,
    side: ContractSide,
    qty: Qty,
    avg_price_cents: i64,
) -> Position {
    let now = Utc::now();
    Position {
        id: Uuid::new_v4().to_string(),
        venue,
        contract: contract_for(mapping, venue),
        mapping_id: Some(mapping.id.clone()),
        side,
        qty,
        avg_price_cents,
        opened_at: now,
        updated_at: now,
    }
}

fn leg_record(
    venue: Venue,
    price_cents: u16,
    qty: Qty,
    order_id: Option<&String>,
    outcome: &str,
) -> LegRecord {
    LegRecord {
        venue,
        price_cents,
        qty,
        order_id: order_id.cloned(),
        outcome: outcome.to_string(),
    }
}

fn leg_from_result(venue: Venue, price_cents: u16, qty: Qty, result: &FillResult) -> LegRecord {
    match result {
        FillResult::Filled {
            fill_price_cents,
            fill_qty,
            order_id,
            ..
        } => leg_record(venue, *fill_price_cents, *fill_qty, Some(order_id), "filled"),
        FillResult::Rejected { order_id, .. } => LegRecord {
            venue,
            price_cents,
            qty,
            order_id: order_id.clone(),
            outcome: "rejected".to_string(),
        },
        FillResult::TransportError { .. } => leg_record(venue, price_cents, qty, None, "transport_error"),
    }
}

fn fill_result_tag(result: &FillResult) -> &'static str {
    match result {
        FillResult::Filled { .. } => "filled",
        FillResult::Rejected { .. } => "rejected",
        FillResult::TransportError { .. } => "transport_error",
    }
}

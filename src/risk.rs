//! Pre-trade risk gating and the derived position ledger.
//!
//! `validate` walks the guard list in a fixed order and reports every
//! violated limit, so a rejection always carries at least one concrete
//! reason. The ledger is a denormalization of the state store's canonical
//! position set and must equal it at every quiescent point; `reconcile`
//! restores that equality from venue-reported positions.

use rustc_hash::FxHashMap;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::info;

use crate::config::Config;
use crate::types::{ContractSide, Inventory, Opportunity, Position, Qty, Venue};

/// Hard limits and economic floors, copied out of [`Config`].
#[derive(Debug, Clone)]
pub struct RiskLimits {
    pub max_total_exposure_cents: i64,
    pub max_exposure_per_event_cents: i64,
    pub max_position_imbalance: Qty,
    pub daily_loss_limit_cents: i64,
    pub min_profit_threshold_bps: u32,
    pub max_qty_per_trade: Qty,
    pub min_qty_per_trade: Qty,
    pub min_trade_value_cents: i64,
    pub min_profit_abs_cents: i64,
    pub min_liquidity_depth: Qty,
}

impl RiskLimits {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            max_total_exposure_cents: cfg.max_total_exposure_cents,
            max_exposure_per_event_cents: cfg.max_exposure_per_event_cents,
            max_position_imbalance: cfg.max_position_imbalance,
            daily_loss_limit_cents: cfg.daily_loss_limit_cents,
            min_profit_threshold_bps: cfg.min_profit_threshold_bps,
            max_qty_per_trade: cfg.max_qty_per_trade,
            min_qty_per_trade: cfg.min_qty_per_trade,
            min_trade_value_cents: cfg.min_trade_value_cents,
            min_profit_abs_cents: cfg.min_profit_abs_cents,
            min_liquidity_depth: cfg.min_liquidity_depth,
        }
    }
}

/// Live inputs the risk manager does not own: breaker flag and daily P&L.
#[derive(Debug, Clone, Copy)]
pub struct RiskContext {
    pub cb_paused: bool,
    pub daily_pnl_cents: i64,
}

/// Outcome of a validation pass.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub approved: bool,
    /// Hard violations, in guard order; non-empty iff not approved.
    pub reasons: Vec<String>,
    /// Non-blocking observations.
    pub warnings: Vec<String>,
    /// A viable smaller size when the proposal itself was too large.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_qty: Option<Qty>,
}

type LedgerKey = (Venue, String, ContractSide);

#[derive(Default)]
struct Ledger {
    positions: FxHashMap<LedgerKey, Position>,
}

impl Ledger {
    fn total_exposure_cents(&self) -> i64 {
        self.positions.values().map(Position::notional_cents).sum()
    }

    fn event_exposure_cents(&self, mapping_id: &str) -> i64 {
        self.positions
            .values()
            .filter(|p| p.mapping_id.as_deref() == Some(mapping_id))
            .map(Position::notional_cents)
            .sum()
    }

    fn inventory(&self, mapping_id: &str, reference_price_cents: i64, max_imbalance: Qty) -> Inventory {
        let mut v1_yes = 0;
        let mut v1_no = 0;
        let mut v2_yes = 0;
        let mut v2_no = 0;
        for p in self.positions.values() {
            if p.mapping_id.as_deref() != Some(mapping_id) {
                continue;
            }
            match (p.venue, p.side) {
                (Venue::V1, ContractSide::Yes) => v1_yes += p.qty,
                (Venue::V1, ContractSide::No) => v1_no += p.qty,
                (Venue::V2, ContractSide::Yes) => v2_yes += p.qty,
                (Venue::V2, ContractSide::No) => v2_no += p.qty,
            }
        }
        Inventory::derive(
            v1_yes,
            v1_no,
            v2_yes,
            v2_no,
            reference_price_cents,
            max_imbalance,
        )
    }
}

pub struct RiskManager {
    limits: RiskLimits,
    ledger: RwLock<Ledger>,
}

impl RiskManager {
    pub fn new(limits: RiskLimits) -> Self {
        Self {
            limits,
            ledger: RwLock::new(Ledger::default()),
        }
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Walk the guard list against `opportunity` at `proposed_qty`.
    ///
    /// Hard failures are collected in order (none is silently masked by an
    /// earlier one); warnings never block. When the proposal fails only on
    /// size, `suggested_qty` carries the largest viable alternative.
    pub async fn validate(
        &self,
        opportunity: &Opportunity,
        proposed_qty: Qty,
        ctx: RiskContext,
    ) -> Decision {
        let limits = &self.limits;
        let mut reasons = Vec::new();
        let mut warnings = Vec::new();

        let ledger = self.ledger.read().await;
        let buy_price = opportunity.buy_price as i64;
        let added_exposure = proposed_qty * buy_price;

        // 1. Breaker. Nothing else matters while paused, but the remaining
        //    guards still run so the decision names every violated limit.
        if ctx.cb_paused {
            reasons.push("circuit breaker paused".to_string());
        }

        // 2. Total exposure cap.
        let total = ledger.total_exposure_cents();
        if total + added_exposure > limits.max_total_exposure_cents {
            reasons.push(format!(
                "total exposure {}c + {}c exceeds cap {}c",
                total, added_exposure, limits.max_total_exposure_cents
            ));
        }

        // 3. Per-event exposure cap.
        let event = ledger.event_exposure_cents(&opportunity.mapping_id);
        if event + added_exposure > limits.max_exposure_per_event_cents {
            reasons.push(format!(
                "event exposure {}c + {}c exceeds cap {}c",
                event, added_exposure, limits.max_exposure_per_event_cents
            ));
        }

        // 4. Inventory imbalance.
        let inventory = ledger.inventory(
            &opportunity.mapping_id,
            buy_price,
            limits.max_position_imbalance,
        );
        if inventory.net_position.abs() > limits.max_position_imbalance {
            reasons.push(format!(
                "imbalance {} exceeds max {}",
                inventory.net_position, limits.max_position_imbalance
            ));
        }

        // 5. Daily loss limit.
        if ctx.daily_pnl_cents < -limits.daily_loss_limit_cents {
            reasons.push(format!(
                "daily pnl {}c below loss limit -{}c",
                ctx.daily_pnl_cents, limits.daily_loss_limit_cents
            ));
        }

        // 6. Fractional profit floor on the buy notional, integer
        //    cross-multiplied: net/notional >= bps/10_000.
        let opp_notional = opportunity.buy_price as i64 * opportunity.max_qty;
        if opportunity.net_total_cents * 10_000
            < limits.min_profit_threshold_bps as i64 * opp_notional
        {
            reasons.push(format!(
                "net profit {}c under {}bps of notional {}c",
                opportunity.net_total_cents, limits.min_profit_threshold_bps, opp_notional
            ));
        }

        // 7. Quantity bounds.
        if proposed_qty < limits.min_qty_per_trade || proposed_qty > limits.max_qty_per_trade {
            reasons.push(format!(
                "qty {} outside [{}, {}]",
                proposed_qty, limits.min_qty_per_trade, limits.max_qty_per_trade
            ));
        }

        // 8. Trade economics: absolute floors.
        if added_exposure < limits.min_trade_value_cents {
            reasons.push(format!(
                "trade value {}c under floor {}c",
                added_exposure, limits.min_trade_value_cents
            ));
        }
        let net_at_qty = if opportunity.max_qty > 0 {
            opportunity.net_total_cents * proposed_qty / opportunity.max_qty
        } else {
            0
        };
        if net_at_qty < limits.min_profit_abs_cents {
            reasons.push(format!(
                "absolute profit {}c under floor {}c",
                net_at_qty, limits.min_profit_abs_cents
            ));
        }

        // 9. Liquidity warning (non-blocking).
        if opportunity.max_qty < limits.min_liquidity_depth {
            warnings.push(format!(
                "thin book: {} < liquidity floor {}",
                opportunity.max_qty, limits.min_liquidity_depth
            ));
        }

        // 10. Execution-risk warning (non-blocking).
        if opportunity.execution_risk > 0.5 {
            warnings.push(format!(
                "execution risk {:.2} above 0.5",
                opportunity.execution_risk
            ));
        }

        drop(ledger);

        let suggested = self.optimal_qty(opportunity).await;
        let suggested_qty = if suggested != proposed_qty && suggested > 0 {
            Some(suggested)
        } else {
            None
        };

        Decision {
            approved: reasons.is_empty(),
            reasons,
            warnings,
            suggested_qty,
        }
    }

    /// Largest size the limits allow for this opportunity:
    /// `min(availabilities, max_qty, max_qty_per_trade, exposure headroom)`,
    /// floored to whole contracts and lifted to `min_qty_per_trade`. The
    /// result is a candidate, not an approval; `validate` still gates it.
    pub async fn optimal_qty(&self, opportunity: &Opportunity) -> Qty {
        let limits = &self.limits;
        let ledger = self.ledger.read().await;
        let headroom = limits.max_total_exposure_cents - ledger.total_exposure_cents();
        let buy_price = opportunity.buy_price.max(1) as i64;

        let qty = opportunity
            .buy_available
            .min(opportunity.sell_available)
            .min(opportunity.max_qty)
            .min(limits.max_qty_per_trade)
            .min((headroom / buy_price).max(0));

        qty.max(limits.min_qty_per_trade)
    }

    /// Fold a fill into the ledger. Exposure is recomputed from positions,
    /// preserving `total_exposure == sum(qty * avg_price)` by construction.
    pub async fn apply_fill(&self, position: Position) {
        let mut ledger = self.ledger.write().await;
        let key = (
            position.venue,
            position.contract.clone(),
            position.side,
        );
        let now = position.updated_at;
        match ledger.positions.get_mut(&key) {
            Some(existing) => existing.absorb(position.qty, position.avg_price_cents, now),
            None => {
                ledger.positions.insert(key, position);
            }
        }
        ledger.positions.retain(|_, p| p.qty > 0);
    }

    /// Replace the ledger wholesale with venue-reported positions.
    pub async fn reconcile(&self, positions: Vec<Position>) {
        let mut ledger = self.ledger.write().await;
        ledger.positions.clear();
        for p in positions.into_iter().filter(|p| p.qty > 0) {
            ledger
                .positions
                .insert((p.venue, p.contract.clone(), p.side), p);
        }
        info!(
            "Risk ledger reconciled: {} positions, exposure {}c",
            ledger.positions.len(),
            ledger.total_exposure_cents()
        );
    }

    pub async fn total_exposure_cents(&self) -> i64 {
        self.ledger.read().await.total_exposure_cents()
    }

    pub async fn event_exposure_cents(&self, mapping_id: &str) -> i64 {
        self.ledger.read().await.event_exposure_cents(mapping_id)
    }

    pub async fn inventory(&self, mapping_id: &str, reference_price_cents: i64) -> Inventory {
        self.ledger.read().await.inventory(
            mapping_id,
            reference_price_cents,
            self.limits.max_position_imbalance,
        )
    }

    pub async fn positions(&self) -> Vec<Position> {
        let ledger = self.ledger.read().await;
        let mut out: Vec<Position> = ledger.positions.values().cloned().collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn limits() -> RiskLimits {
        RiskLimits {
            max_total_exposure_cents: 100_000,
            max_exposure_per_event_cents: 25_000,
            max_position_imbalance: 10,
            daily_loss_limit_cents: 20_000,
            min_profit_threshold_bps: 100,
            max_qty_per_trade: 500,
            min_qty_per_trade: 1,
            min_trade_value_cents: 100,
            min_profit_abs_cents: 10,
            min_liquidity_depth: 50,
        }
    }

    fn ok_ctx() -> RiskContext {
        RiskContext {
            cb_paused: false,
            daily_pnl_cents: 0,
        }
    }

    fn opportunity(buy: u16, sell: u16, qty: Qty, net_total: i64) -> Opportunity {
        let now = Utc::now();
        Opportunity {
            id: "o1".into(),
            created_at: now,
            mapping_id: "m1".into(),
            buy_venue: Venue::V1,
            buy_price: buy,
            buy_available: qty,
            sell_venue: Venue::V2,
            sell_price: sell,
            sell_available: qty,
            gross_spread_cents: sell - buy,
            est_fees_cents: (sell - buy) as i64 * qty - net_total,
            net_total_cents: net_total,
            max_qty: qty,
            execution_risk: 0.2,
            expires_at: now + chrono::Duration::seconds(5),
        }
    }

    fn position(venue: Venue, contract: &str, side: ContractSide, qty: Qty, price: i64) -> Position {
        let now = Utc::now();
        Position {
            id: format!("{}-{}-{}", venue, contract, side),
            venue,
            contract: contract.to_string(),
            mapping_id: Some("m1".to_string()),
            side,
            qty,
            avg_price_cents: price,
            opened_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_clean_approval_has_no_reasons() {
        let rm = RiskManager::new(limits());
        let opp = opportunity(42, 50, 100, 316);
        let decision = rm.validate(&opp, 100, ok_ctx()).await;
        assert!(decision.approved, "{:?}", decision.reasons);
        assert!(decision.reasons.is_empty());
    }

    #[tokio::test]
    async fn test_breaker_pause_rejects() {
        let rm = RiskManager::new(limits());
        let opp = opportunity(42, 50, 100, 316);
        let decision = rm
            .validate(
                &opp,
                100,
                RiskContext {
                    cb_paused: true,
                    daily_pnl_cents: 0,
                },
            )
            .await;
        assert!(!decision.approved);
        assert!(decision.reasons[0].contains("circuit breaker"));
    }

    #[tokio::test]
    async fn test_total_exposure_cap() {
        let rm = RiskManager::new(limits());
        rm.apply_fill(position(Venue::V1, "c1", ContractSide::Yes, 1_000, 99))
            .await;
        // 99_000c held; 100 more at 42c = 4_200c busts the 100_000c cap.
        let opp = opportunity(42, 50, 100, 316);
        let decision = rm.validate(&opp, 100, ok_ctx()).await;
        assert!(!decision.approved);
        assert!(decision
            .reasons
            .iter()
            .any(|r| r.contains("total exposure")));
    }

    #[tokio::test]
    async fn test_event_exposure_cap() {
        let rm = RiskManager::new(limits());
        rm.apply_fill(position(Venue::V1, "c1", ContractSide::Yes, 500, 49))
            .await; // 24_500c on mapping m1
        let opp = opportunity(42, 50, 100, 316); // +4_200c would breach 25_000c
        let decision = rm.validate(&opp, 100, ok_ctx()).await;
        assert!(!decision.approved);
        assert!(decision
            .reasons
            .iter()
            .any(|r| r.contains("event exposure")));
    }

    #[tokio::test]
    async fn test_imbalance_rejects() {
        let rm = RiskManager::new(limits());
        // 20 net YES on mapping m1, above the max of 10.
        rm.apply_fill(position(Venue::V1, "c1", ContractSide::Yes, 20, 40))
            .await;
        let opp = opportunity(42, 50, 100, 316);
        let decision = rm.validate(&opp, 100, ok_ctx()).await;
        assert!(decision.reasons.iter().any(|r| r.contains("imbalance")));
    }

    #[tokio::test]
    async fn test_daily_loss_limit() {
        let rm = RiskManager::new(limits());
        let opp = opportunity(42, 50, 100, 316);
        let decision = rm
            .validate(
                &opp,
                100,
                RiskContext {
                    cb_paused: false,
                    daily_pnl_cents: -20_001,
                },
            )
            .await;
        assert!(decision.reasons.iter().any(|r| r.contains("daily pnl")));
    }

    #[tokio::test]
    async fn test_profit_threshold() {
        let rm = RiskManager::new(limits());
        // net 30c on 4_200c notional = 71bps < 100bps.
        let opp = opportunity(42, 50, 100, 30);
        let decision = rm.validate(&opp, 100, ok_ctx()).await;
        assert!(decision.reasons.iter().any(|r| r.contains("bps")));
    }

    #[tokio::test]
    async fn test_qty_bounds_and_suggestion() {
        let rm = RiskManager::new(limits());
        let opp = opportunity(42, 50, 100, 316);
        let decision = rm.validate(&opp, 600, ok_ctx()).await;
        assert!(!decision.approved);
        assert!(decision.reasons.iter().any(|r| r.contains("outside")));
        // A viable smaller size exists.
        assert_eq!(decision.suggested_qty, Some(100));
    }

    #[tokio::test]
    async fn test_trade_economics() {
        let mut lim = limits();
        lim.min_trade_value_cents = 10_000;
        let rm = RiskManager::new(lim);
        let opp = opportunity(42, 50, 100, 316);
        // 100 x 42c = 4_200c < 10_000c floor.
        let decision = rm.validate(&opp, 100, ok_ctx()).await;
        assert!(decision.reasons.iter().any(|r| r.contains("trade value")));
    }

    #[tokio::test]
    async fn test_warnings_do_not_block() {
        let rm = RiskManager::new(limits());
        // Thin book (40 < 50) and high execution risk, but profitable: the
        // detector would normally reject this, the risk layer only warns.
        let mut opp = opportunity(42, 50, 40, 130);
        opp.execution_risk = 0.8;
        let decision = rm.validate(&opp, 40, ok_ctx()).await;
        assert!(decision.approved, "{:?}", decision.reasons);
        assert_eq!(decision.warnings.len(), 2);
    }

    #[tokio::test]
    async fn test_rejection_always_carries_reasons() {
        let rm = RiskManager::new(limits());
        let opp = opportunity(42, 50, 100, 0);
        for qty in [0, 1, 100, 10_000] {
            let decision = rm.validate(&opp, qty, ok_ctx()).await;
            if !decision.approved {
                assert!(!decision.reasons.is_empty(), "qty={}", qty);
            }
        }
    }

    #[tokio::test]
    async fn test_optimal_qty_takes_minimum() {
        let rm = RiskManager::new(limits());
        // Exposure headroom: 100_000 / 42 = 2_380; availability 100 binds.
        let opp = opportunity(42, 50, 100, 316);
        assert_eq!(rm.optimal_qty(&opp).await, 100);

        // Per-trade cap binds.
        let opp = opportunity(42, 50, 10_000, 31_600);
        assert_eq!(rm.optimal_qty(&opp).await, 500);

        // Exposure headroom binds after fills.
        rm.apply_fill(position(Venue::V1, "c1", ContractSide::Yes, 990, 99))
            .await; // 98_010c held, headroom 1_990c -> 47 contracts @42c
        assert_eq!(rm.optimal_qty(&opp).await, 47);
    }

    #[tokio::test]
    async fn test_ledger_exposure_invariant() {
        let rm = RiskManager::new(limits());
        rm.apply_fill(position(Venue::V1, "c1", ContractSide::Yes, 10, 40))
            .await;
        rm.apply_fill(position(Venue::V2, "c2", ContractSide::No, 10, 50))
            .await;
        rm.apply_fill(position(Venue::V1, "c1", ContractSide::Yes, 10, 50))
            .await;

        let positions = rm.positions().await;
        let expected: i64 = positions.iter().map(Position::notional_cents).sum();
        assert_eq!(rm.total_exposure_cents().await, expected);
        // c1 aggregated to 20 @ 45.
        let c1 = positions
            .iter()
            .find(|p| p.contract == "c1")
            .unwrap();
        assert_eq!(c1.qty, 20);
        assert_eq!(c1.avg_price_cents, 45);
    }

    #[tokio::test]
    async fn test_reconcile_replaces_ledger() {
        let rm = RiskManager::new(limits());
        rm.apply_fill(position(Venue::V1, "c1", ContractSide::Yes, 10, 40))
            .await;

        let replacement = vec![
            position(Venue::V2, "c9", ContractSide::No, 5, 60),
            position(Venue::V1, "c8", ContractSide::Yes, 7, 30),
        ];
        rm.reconcile(replacement.clone()).await;

        let positions = rm.positions().await;
        assert_eq!(positions.len(), 2);
        assert_eq!(rm.total_exposure_cents().await, 5 * 60 + 7 * 30);
        assert!(positions.iter().all(|p| p.contract != "c1"));
    }

    #[tokio::test]
    async fn test_inventory_view() {
        let rm = RiskManager::new(limits());
        rm.apply_fill(position(Venue::V1, "c1", ContractSide::Yes, 10, 42))
            .await;
        rm.apply_fill(position(Venue::V2, "c2", ContractSide::No, 10, 50))
            .await;

        let inv = rm.inventory("m1", 42).await;
        assert_eq!(inv.v1_yes, 10);
        assert_eq!(inv.v2_no, 10);
        assert_eq!(inv.net_position, 0);
        assert!(!inv.needs_rebalance);
    }
}

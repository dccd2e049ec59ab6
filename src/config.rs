//! Engine configuration.
//!
//! All options load from environment variables with safe defaults; invalid
//! values log a warning and fall back rather than aborting startup. Monetary
//! limits are integer cents, fractional thresholds are basis points, so the
//! whole risk surface stays in integer math.

use serde::Serialize;
use std::str::FromStr;
use tracing::warn;

use crate::types::Qty;

/// Whether order placement touches real venues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Synthesize fills at opportunity prices; never call a venue.
    DryRun,
    /// Real fill-or-kill placement.
    Live,
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatingMode::DryRun => write!(f, "dry_run"),
            OperatingMode::Live => write!(f, "live"),
        }
    }
}

/// Parse an env var, warning and defaulting on failure.
fn env_parse<T: FromStr + std::fmt::Display + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!("Failed to parse {}='{}', using default {}", key, raw, default);
                default
            }
        },
        Err(_) => default,
    }
}

/// Parse a boolean env var ("1"/"true" = true, "0"/"false" = false).
fn env_flag(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            other => {
                warn!("Invalid {}='{}', using default {}", key, other, default);
                default
            }
        },
        Err(_) => default,
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Full engine configuration. Built once at startup and shared by handle.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    // --- mode ---
    pub operating_mode: OperatingMode,

    // --- detection & execution thresholds ---
    /// Fractional profit floor in basis points of the buy price.
    pub min_profit_threshold_bps: u32,
    /// Revalidation envelope before firing, basis points.
    pub max_slippage_bps: u32,
    /// Opportunities thinner than this many contracts are rejected.
    pub min_liquidity_depth: Qty,
    pub opportunity_ttl_ms: u64,

    // --- risk limits (cents unless noted) ---
    pub max_total_exposure_cents: i64,
    pub max_exposure_per_event_cents: i64,
    /// Maximum absolute net YES-equivalent contracts per mapping.
    pub max_position_imbalance: Qty,
    pub daily_loss_limit_cents: i64,
    pub max_qty_per_trade: Qty,
    pub min_qty_per_trade: Qty,
    pub min_trade_value_cents: i64,
    pub min_profit_abs_cents: i64,

    // --- matcher ---
    pub min_confidence_threshold: f64,
    pub fuzzy_threshold: f64,
    pub require_date_validation: bool,
    pub require_category_match: bool,
    pub date_tolerance_hours: i64,
    /// Optional JSON file with extra title aliases for tokenization.
    pub alias_file: Option<String>,

    // --- fees ---
    pub v1_taker_fee_bps: u32,
    /// Amortized on-chain settlement cost per v1 leg, cents.
    pub v1_settlement_cost_cents: i64,
    pub v2_payout_fee_bps: u32,
    /// Cap on the v2 payout fee, cents per contract.
    pub v2_payout_fee_cap_cents: i64,

    // --- latency ceilings ---
    pub end_to_end_max_ms: u64,
    pub order_placement_max_ms: u64,
    pub orderbook_fetch_max_ms: u64,
    /// Deadline for the double-ambiguity reconciliation pass.
    pub reconcile_timeout_ms: u64,

    // --- circuit breaker ---
    pub max_consecutive_failures: u32,
    pub max_asymmetric_executions: u32,

    // --- feed / reconnect policy ---
    pub ws_reconnect_initial_ms: u64,
    pub ws_reconnect_cap_ms: u64,
    pub ws_reconnect_max_attempts: u32,
    pub heartbeat_timeout_s: u64,

    // --- durability ---
    pub state_file_path: String,
    pub auto_save_interval_s: u64,
    /// Consecutive snapshot failures before StateUnrecoverable escalates.
    pub state_failure_escalation: u32,
    pub records_dir: String,

    // --- supervisor ---
    pub scan_interval_ms: u64,
    /// Keep detecting (for observability) while the breaker is paused.
    pub detect_while_paused: bool,
    /// Refuse auto-start when startup produced warnings.
    pub require_manual_review: bool,
    /// Snapshots older than this gate the scan loop behind operator resume.
    pub max_state_age_minutes: i64,
    /// Scan interval multiplier applied after a hard rate limit.
    pub rate_limit_throttle: u32,

    // --- alerting ---
    pub alert_webhook_url: Option<String>,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Self {
        let operating_mode = match std::env::var("OPERATING_MODE")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "live" => OperatingMode::Live,
            "dry_run" | "" => OperatingMode::DryRun,
            other => {
                warn!("Unknown OPERATING_MODE='{}', defaulting to dry_run", other);
                OperatingMode::DryRun
            }
        };

        Self {
            operating_mode,

            min_profit_threshold_bps: env_parse("MIN_PROFIT_THRESHOLD_BPS", 100),
            max_slippage_bps: env_parse("MAX_SLIPPAGE_BPS", 500),
            min_liquidity_depth: env_parse("MIN_LIQUIDITY_DEPTH", 50),
            opportunity_ttl_ms: env_parse("OPPORTUNITY_TTL_MS", 5_000),

            max_total_exposure_cents: env_parse("MAX_TOTAL_EXPOSURE_CENTS", 100_000),
            max_exposure_per_event_cents: env_parse("MAX_EXPOSURE_PER_EVENT_CENTS", 25_000),
            max_position_imbalance: env_parse("MAX_POSITION_IMBALANCE", 10),
            daily_loss_limit_cents: env_parse("DAILY_LOSS_LIMIT_CENTS", 20_000),
            max_qty_per_trade: env_parse("MAX_QTY_PER_TRADE", 500),
            min_qty_per_trade: env_parse("MIN_QTY_PER_TRADE", 1),
            min_trade_value_cents: env_parse("MIN_TRADE_VALUE_CENTS", 100),
            min_profit_abs_cents: env_parse("MIN_PROFIT_ABS_CENTS", 10),

            min_confidence_threshold: env_parse("MIN_CONFIDENCE_THRESHOLD", 0.95),
            fuzzy_threshold: env_parse("FUZZY_THRESHOLD", 0.95),
            require_date_validation: env_flag("REQUIRE_DATE_VALIDATION", true),
            require_category_match: env_flag("REQUIRE_CATEGORY_MATCH", true),
            date_tolerance_hours: env_parse("DATE_TOLERANCE_HOURS", 24),
            alias_file: env_opt("ALIAS_FILE"),

            v1_taker_fee_bps: env_parse("V1_TAKER_FEE_BPS", 200),
            v1_settlement_cost_cents: env_parse("V1_SETTLEMENT_COST_CENTS", 50),
            v2_payout_fee_bps: env_parse("V2_PAYOUT_FEE_BPS", 700),
            v2_payout_fee_cap_cents: env_parse("V2_PAYOUT_FEE_CAP_CENTS", 7),

            end_to_end_max_ms: env_parse("END_TO_END_MAX_MS", 2_000),
            order_placement_max_ms: env_parse("ORDER_PLACEMENT_MAX_MS", 1_500),
            orderbook_fetch_max_ms: env_parse("ORDERBOOK_FETCH_MAX_MS", 1_000),
            reconcile_timeout_ms: env_parse("RECONCILE_TIMEOUT_MS", 3_000),

            max_consecutive_failures: env_parse("MAX_CONSECUTIVE_FAILURES", 3),
            max_asymmetric_executions: env_parse("MAX_ASYMMETRIC_EXECUTIONS", 1),

            ws_reconnect_initial_ms: env_parse("WS_RECONNECT_INITIAL_MS", 1_000),
            ws_reconnect_cap_ms: env_parse("WS_RECONNECT_CAP_MS", 30_000),
            ws_reconnect_max_attempts: env_parse("WS_RECONNECT_MAX_ATTEMPTS", 5),
            heartbeat_timeout_s: env_parse("HEARTBEAT_TIMEOUT_S", 30),

            state_file_path: std::env::var("STATE_FILE_PATH")
                .unwrap_or_else(|_| "./data/engine_state.json".to_string()),
            auto_save_interval_s: env_parse("AUTO_SAVE_INTERVAL_S", 30),
            state_failure_escalation: env_parse("STATE_FAILURE_ESCALATION", 5),
            records_dir: std::env::var("RECORDS_DIR")
                .unwrap_or_else(|_| "./data/records".to_string()),

            scan_interval_ms: env_parse("SCAN_INTERVAL_MS", 1_000),
            detect_while_paused: env_flag("DETECT_WHILE_PAUSED", true),
            require_manual_review: env_flag("REQUIRE_MANUAL_REVIEW", false),
            max_state_age_minutes: env_parse("MAX_STATE_AGE_MINUTES", 60),
            rate_limit_throttle: env_parse("RATE_LIMIT_THROTTLE", 4),

            alert_webhook_url: env_opt("ALERT_WEBHOOK_URL"),
        }
    }

    /// Sanity-check the loaded values; returns human-readable warnings.
    ///
    /// Warnings do not stop startup unless `require_manual_review` is set,
    /// in which case the supervisor refuses to auto-start the scan loop.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.min_qty_per_trade > self.max_qty_per_trade {
            warnings.push(format!(
                "min_qty_per_trade {} exceeds max_qty_per_trade {}",
                self.min_qty_per_trade, self.max_qty_per_trade
            ));
        }
        if self.max_exposure_per_event_cents > self.max_total_exposure_cents {
            warnings.push(format!(
                "per-event exposure cap {}c exceeds total cap {}c",
                self.max_exposure_per_event_cents, self.max_total_exposure_cents
            ));
        }
        if !(0.0..=1.0).contains(&self.fuzzy_threshold)
            || !(0.0..=1.0).contains(&self.min_confidence_threshold)
        {
            warnings.push("matcher thresholds must lie in [0, 1]".to_string());
        }
        if self.min_profit_threshold_bps == 0 {
            warnings.push("min_profit_threshold_bps=0 trades at break-even".to_string());
        }
        if self.operating_mode == OperatingMode::Live && self.daily_loss_limit_cents == 0 {
            warnings.push("live mode with daily_loss_limit_cents=0".to_string());
        }

        warnings
    }

    pub fn opportunity_ttl(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.opportunity_ttl_ms as i64)
    }

    pub fn scan_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.scan_interval_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

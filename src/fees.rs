//! Fee model for the two venues.
//!
//! Pure, deterministic, integer-cent math with ceiling division: totals are
//! computed first so per-contract rounding never accumulates.
//!
//! ## Formulas
//!
//! ### V1 (crypto-settled CLOB)
//! - Buy leg: `ceil(taker_bps × price × qty / 10_000)` cents on the notional.
//! - Sell leg: the same taker rate applied to the winning payout,
//!   `ceil(taker_bps × (100 - price) × qty / 10_000)` cents.
//! - Each V1 leg additionally carries the amortized on-chain settlement cost.
//!
//! ### V2 (regulated USD CLOB)
//! - Sell leg only: `payout_bps` of the potential payout `(100 - price)`,
//!   capped at `payout_fee_cap_cents` per contract. No fee on buys.

use serde::Serialize;

use crate::config::Config;
use crate::types::{PriceCents, Qty, Venue};

/// Fee schedule knobs, copied out of [`Config`] so the model stays pure.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeeParams {
    pub v1_taker_fee_bps: u32,
    pub v1_settlement_cost_cents: i64,
    pub v2_payout_fee_bps: u32,
    pub v2_payout_fee_cap_cents: i64,
}

impl FeeParams {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            v1_taker_fee_bps: cfg.v1_taker_fee_bps,
            v1_settlement_cost_cents: cfg.v1_settlement_cost_cents,
            v2_payout_fee_bps: cfg.v2_payout_fee_bps,
            v2_payout_fee_cap_cents: cfg.v2_payout_fee_cap_cents,
        }
    }
}

impl Default for FeeParams {
    fn default() -> Self {
        Self {
            v1_taker_fee_bps: 200,
            v1_settlement_cost_cents: 50,
            v2_payout_fee_bps: 700,
            v2_payout_fee_cap_cents: 7,
        }
    }
}

/// Ceiling division on non-negative integers.
#[inline]
fn ceil_div(numerator: i64, denominator: i64) -> i64 {
    (numerator + denominator - 1) / denominator
}

/// Total V1 taker fee on a buy notional, cents.
#[inline]
pub fn v1_buy_fee_cents(params: &FeeParams, price: PriceCents, qty: Qty) -> i64 {
    if price == 0 || price >= 100 || qty <= 0 {
        return 0;
    }
    ceil_div(params.v1_taker_fee_bps as i64 * price as i64 * qty, 10_000)
}

/// Total V1 taker fee on the winning payout of a sell leg, cents.
#[inline]
pub fn v1_sell_fee_cents(params: &FeeParams, price: PriceCents, qty: Qty) -> i64 {
    if price == 0 || price >= 100 || qty <= 0 {
        return 0;
    }
    ceil_div(
        params.v1_taker_fee_bps as i64 * (100 - price as i64) * qty,
        10_000,
    )
}

/// Total V2 payout fee on a sell leg, cents, capped per contract.
#[inline]
pub fn v2_sell_fee_cents(params: &FeeParams, price: PriceCents, qty: Qty) -> i64 {
    if price == 0 || price >= 100 || qty <= 0 {
        return 0;
    }
    let uncapped = ceil_div(
        params.v2_payout_fee_bps as i64 * (100 - price as i64) * qty,
        10_000,
    );
    uncapped.min(params.v2_payout_fee_cap_cents * qty)
}

/// Total estimated fees for a two-leg trade: buy `qty` at `buy_price` on
/// `buy_venue`, sell `qty` at `sell_price` on `sell_venue`.
///
/// Monotone non-decreasing in `qty` and, for the V2 sell leg, in
/// `(100 - sell_price)`.
pub fn trade_fees_cents(
    params: &FeeParams,
    buy_venue: Venue,
    sell_venue: Venue,
    buy_price: PriceCents,
    sell_price: PriceCents,
    qty: Qty,
) -> i64 {
    if qty <= 0 {
        return 0;
    }
    let mut total = 0i64;

    match buy_venue {
        Venue::V1 => {
            total += v1_buy_fee_cents(params, buy_price, qty);
            total += params.v1_settlement_cost_cents;
        }
        Venue::V2 => {
            // V2 charges nothing on buys.
        }
    }

    match sell_venue {
        Venue::V1 => {
            total += v1_sell_fee_cents(params, sell_price, qty);
            total += params.v1_settlement_cost_cents;
        }
        Venue::V2 => {
            total += v2_sell_fee_cents(params, sell_price, qty);
        }
    }

    total
}

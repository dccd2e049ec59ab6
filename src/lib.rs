//! Cross-Venue Prediction Market Arbitrage Engine
//!
//! A production arbitrage trading system for binary prediction markets listed
//! on two venues: a crypto-settled CLOB ("v1") and a regulated USD CLOB
//! ("v2"). The engine maps equivalent contracts across venues, watches both
//! tops of book, and executes offsetting two-leg fill-or-kill trades under
//! strict risk limits and a global circuit breaker.

pub mod adapters;
pub mod alert;
pub mod books;
pub mod circuit_breaker;
pub mod cli;
pub mod config;
pub mod detector;
pub mod error;
pub mod execution;
pub mod feed;
pub mod fees;
pub mod logging;
pub mod matcher;
pub mod records;
pub mod retry;
pub mod risk;
pub mod state;
pub mod supervisor;
pub mod types;
pub mod venue;

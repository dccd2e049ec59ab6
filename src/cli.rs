//! Operator shell over the running process.
//!
//! Reads commands from stdin and answers on stdout; the process keeps
//! trading underneath. `live` requires an explicit `--confirm` so a stray
//! keystroke can never arm real order placement.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::info;

use crate::config::OperatingMode;
use crate::supervisor::{scan_once, startup_gate, Services};
use crate::types::Venue;

const HELP: &str = "\
commands:
  status         mode, breaker, daily counters, positions
  health         per-venue connectivity and feed freshness
  positions      open positions
  balance        per-venue balances
  pause          pause trading (manual)
  resume         resume trading and open the scan gate
  dry-run        switch to dry-run mode
  live --confirm switch to live order placement
  scan           run one scan pass now
  mappings       active event mappings
  opportunities  cached unexpired opportunities
  config         effective configuration
  quit           graceful shutdown";

/// Run the shell until `quit` or stdin closes.
pub async fn run_shell(services: Arc<Services>, shutdown: watch::Sender<bool>) {
    let stdin = BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();
    println!("operator shell ready (type 'help')");

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            // stdin closed: keep the process running headless.
            Ok(None) => return,
            Err(_) => return,
        };
        let mut parts = line.split_whitespace();
        let Some(command) = parts.next() else { continue };
        let arg = parts.next();

        match command {
            "help" => println!("{}", HELP),
            "status" => cmd_status(&services).await,
            "health" => cmd_health(&services).await,
            "positions" => cmd_positions(&services).await,
            "balance" => cmd_balance(&services).await,
            "pause" => {
                services.breaker.pause("manual").await;
                println!("paused");
            }
            "resume" => cmd_resume(&services).await,
            "dry-run" => {
                services.mode.set(OperatingMode::DryRun);
                info!(event = "mode_changed", mode = "dry_run", "Mode changed");
                println!("mode: dry_run");
            }
            "live" => {
                if arg == Some("--confirm") {
                    services.mode.set(OperatingMode::Live);
                    info!(event = "mode_changed", mode = "live", "Mode changed");
                    println!("mode: LIVE (real orders will be placed)");
                } else {
                    println!("refusing: use 'live --confirm'");
                }
            }
            "scan" => {
                let summary = scan_once(&services).await;
                println!(
                    "scanned {} mappings, {} opportunities, {} executions ({} filled){}",
                    summary.mappings_scanned,
                    summary.opportunities_found,
                    summary.executions_attempted,
                    summary.executions_filled,
                    if summary.rate_limited { " [rate limited]" } else { "" }
                );
            }
            "mappings" => cmd_mappings(&services).await,
            "opportunities" => cmd_opportunities(&services).await,
            "config" => {
                match serde_json::to_string_pretty(&services.config) {
                    Ok(json) => println!("{}", json),
                    Err(e) => println!("config serialization failed: {}", e),
                }
                println!("operating_mode (live): {}", services.mode.get());
            }
            "quit" => {
                println!("shutting down...");
                let _ = shutdown.send(true);
                return;
            }
            other => println!("unknown command '{}' (try 'help')", other),
        }
    }
}

async fn cmd_status(services: &Services) {
    let state = services.state.current().await;
    let breaker = services.breaker.status().await;
    println!("mode:        {}", services.mode.get());
    println!(
        "scan gate:   {}",
        if services.scan_gate.load(Ordering::Acquire) {
            "open"
        } else {
            "closed (resume to open)"
        }
    );
    println!(
        "breaker:     {}{}",
        if breaker.paused { "PAUSED" } else { "running" },
        breaker
            .reason
            .map(|r| format!(" ({})", r))
            .unwrap_or_default()
    );
    println!(
        "today:       pnl {}c over {} trades, volume {}",
        state.daily_pnl_cents, state.daily_trade_count, state.daily_volume
    );
    println!("positions:   {}", state.positions.len());
    println!(
        "exposure:    {}c",
        services.risk.total_exposure_cents().await
    );
}

async fn cmd_health(services: &Services) {
    let now_ms = chrono::Utc::now().timestamp_millis() as u64;
    for venue in [Venue::V1, Venue::V2] {
        let adapter = services.adapter(venue);
        let rest = match tokio::time::timeout(Duration::from_secs(3), adapter.get_balances()).await
        {
            Ok(Ok(_)) => "ok".to_string(),
            Ok(Err(e)) => format!("error: {}", e),
            Err(_) => "timeout".to_string(),
        };
        let disabled = services.health.is_disabled(venue);

        // Feed freshness: the stalest cached book among this venue's
        // mapped contracts.
        let mut worst_age: Option<u64> = None;
        for mapping in services.matcher.active_mappings().await {
            let contract = match venue {
                Venue::V1 => &mapping.v1_contract,
                Venue::V2 => &mapping.v2_contract,
            };
            if let Some(age) = services.books.age_ms(venue, contract, now_ms).await {
                worst_age = Some(worst_age.map_or(age, |w: u64| w.max(age)));
            }
        }
        let feed = match worst_age {
            Some(age) => format!("stalest book {}ms", age),
            None => "no cached books".to_string(),
        };
        println!(
            "{}: rest={} feed={}{}",
            venue,
            rest,
            feed,
            if disabled { " [DISABLED]" } else { "" }
        );
    }
}

async fn cmd_positions(services: &Services) {
    let positions = services.state.positions().await;
    if positions.is_empty() {
        println!("no open positions");
        return;
    }
    for p in positions {
        println!(
            "{} {} {} x{} @ {}c (mapping {})",
            p.venue,
            p.contract,
            p.side,
            p.qty,
            p.avg_price_cents,
            p.mapping_id.as_deref().unwrap_or("-")
        );
    }
}

async fn cmd_balance(services: &Services) {
    for venue in [Venue::V1, Venue::V2] {
        match services.adapter(venue).get_balances().await {
            Ok(balances) if balances.is_empty() => println!("{}: no balances", venue),
            Ok(balances) => {
                for b in balances {
                    println!(
                        "{}: {} available {}c locked {}c",
                        venue, b.currency, b.available_cents, b.locked_cents
                    );
                }
            }
            Err(e) => println!("{}: error: {}", venue, e),
        }
    }
}

async fn cmd_resume(services: &Services) {
    if services.breaker.is_paused() {
        services.breaker.resume().await;
        println!("breaker resumed");
    } else {
        println!("breaker was not paused");
    }
    if !services.scan_gate.swap(true, Ordering::AcqRel) {
        let gate = startup_gate(services).await;
        if !gate.is_empty() {
            // The operator overrides the gate knowingly; echo what it held.
            for reason in gate {
                println!("note: {}", reason);
            }
        }
        println!("scan gate opened");
    }
}

async fn cmd_mappings(services: &Services) {
    let mappings = services.matcher.active_mappings().await;
    if mappings.is_empty() {
        println!("no active mappings");
        return;
    }
    for m in mappings {
        println!(
            "{} {} <-> {} conf={:.3} method={} resolves={} {}",
            m.id,
            m.v1_contract,
            m.v2_contract,
            m.confidence,
            m.method,
            m.resolution_time.format("%Y-%m-%d"),
            if services.matcher.can_trade(&m) {
                "tradable"
            } else {
                "below confidence floor"
            }
        );
    }
}

async fn cmd_opportunities(services: &Services) {
    let now = chrono::Utc::now();
    let opportunities = services.detector.cached_opportunities(now).await;
    if opportunities.is_empty() {
        println!("no live opportunities");
        return;
    }
    for o in opportunities {
        println!(
            "{}: buy {} @{}c / sell {} @{}c, qty {}, net {}c, expires {}",
            o.mapping_id,
            o.buy_venue,
            o.buy_price,
            o.sell_venue,
            o.sell_price,
            o.max_qty,
            o.net_total_cents,
            o.expires_at.format("%H:%M:%S")
        );
    }
}

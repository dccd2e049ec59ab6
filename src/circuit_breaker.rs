//! Global kill switch driven by the failure taxonomy.
//!
//! Single-writer, many-reader: readers see one atomic flag, writers take a
//! short mutex. A pause is persisted through the state store before the
//! flag flips, so an observed pause is always durable across a crash.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::alert::{Alerter, Severity};
use crate::error::FailureKind;
use crate::state::{CbPersisted, StateStore};

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive execution failures before auto-pause.
    pub max_consecutive_failures: u32,
    /// Asymmetric executions tolerated before auto-pause (1 = first trips).
    pub max_asymmetric_executions: u32,
}

impl CircuitBreakerConfig {
    pub fn from_config(cfg: &crate::config::Config) -> Self {
        Self {
            max_consecutive_failures: cfg.max_consecutive_failures,
            max_asymmetric_executions: cfg.max_asymmetric_executions,
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
            max_asymmetric_executions: 1,
        }
    }
}

/// Snapshot of breaker state for the operator surface.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub paused: bool,
    pub reason: Option<String>,
    pub paused_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub asymmetric_count: u32,
}

#[derive(Debug, Default)]
struct Counters {
    reason: Option<String>,
    paused_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    asymmetric_count: u32,
}

pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    paused: AtomicBool,
    inner: Mutex<Counters>,
    store: Arc<StateStore>,
    alerter: Arc<dyn Alerter>,
}

impl CircuitBreaker {
    pub fn new(
        config: CircuitBreakerConfig,
        store: Arc<StateStore>,
        alerter: Arc<dyn Alerter>,
    ) -> Self {
        Self {
            config,
            paused: AtomicBool::new(false),
            inner: Mutex::new(Counters::default()),
            store,
            alerter,
        }
    }

    /// Rebuild from the persisted flag at startup.
    pub async fn restore(&self, persisted: &CbPersisted) {
        if persisted.paused {
            let mut inner = self.inner.lock().await;
            inner.reason = persisted.reason.clone();
            inner.paused_at = persisted.paused_at;
            self.paused.store(true, Ordering::Release);
            warn!(
                "Circuit breaker restored PAUSED (reason: {})",
                persisted.reason.as_deref().unwrap_or("unknown")
            );
        }
    }

    /// Hot-path check; a paused breaker blocks all execution attempts.
    #[inline]
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Pause trading. Idempotent: while paused, later calls change neither
    /// the recorded reason nor the timestamp.
    pub async fn pause(&self, reason: &str) {
        {
            let mut inner = self.inner.lock().await;
            if self.paused.load(Ordering::Acquire) {
                info!("pause('{}') ignored, already paused", reason);
                return;
            }
            inner.reason = Some(reason.to_string());
            inner.paused_at = Some(Utc::now());

            // Durable before observable: persist while still holding the
            // writer lock, then flip the flag.
            if let Err(e) = self
                .store
                .set_cb(true, inner.reason.clone(), inner.paused_at)
                .await
            {
                // Pausing must not be abandoned because the disk is sick;
                // trading with an unpersisted pause is still safer than
                // trading at all.
                error!("Failed to persist pause: {}", e);
            }
            self.paused.store(true, Ordering::Release);
        }

        error!(event = "circuit_breaker_paused", reason = reason, "TRADING PAUSED");
        self.alerter
            .send(
                Severity::Critical,
                "circuit_breaker_paused",
                &format!("trading paused: {}", reason),
            )
            .await;
    }

    /// Resume trading and clear all counters.
    pub async fn resume(&self) {
        {
            let mut inner = self.inner.lock().await;
            inner.reason = None;
            inner.paused_at = None;
            inner.consecutive_failures = 0;
            inner.asymmetric_count = 0;
            self.paused.store(false, Ordering::Release);
            if let Err(e) = self.store.set_cb(false, None, None).await {
                warn!("Failed to persist resume: {}", e);
            }
        }
        info!(event = "circuit_breaker_resumed", "Trading resumed");
        self.alerter
            .send(Severity::Medium, "circuit_breaker_resumed", "trading resumed")
            .await;
    }

    /// Record a classified failure and apply the auto-pause rules.
    pub async fn record_failure(&self, kind: FailureKind) {
        let pause_reason = {
            let mut inner = self.inner.lock().await;
            match kind {
                FailureKind::ExecutionFailure => {
                    inner.consecutive_failures += 1;
                    if inner.consecutive_failures >= self.config.max_consecutive_failures {
                        Some(format!(
                            "{} consecutive execution failures",
                            inner.consecutive_failures
                        ))
                    } else {
                        None
                    }
                }
                FailureKind::AsymmetricExecution => {
                    inner.asymmetric_count += 1;
                    if inner.asymmetric_count >= self.config.max_asymmetric_executions {
                        Some("asymmetric_execution".to_string())
                    } else {
                        None
                    }
                }
                FailureKind::ConnectionLost => Some("connection_lost".to_string()),
                FailureKind::DailyLossLimit => Some("daily_loss_limit".to_string()),
                FailureKind::StateUnrecoverable => Some("state_unrecoverable".to_string()),
                // Hard rate limits throttle the scan loop, never pause.
                FailureKind::RateLimitExceeded => None,
            }
        };

        warn!(event = "failure_recorded", kind = %kind, "Failure recorded");
        if let Some(reason) = pause_reason {
            self.pause(&reason).await;
        }
    }

    /// A successful execution resets the consecutive-failure streak only.
    pub async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.consecutive_failures = 0;
    }

    pub async fn status(&self) -> BreakerStatus {
        let inner = self.inner.lock().await;
        BreakerStatus {
            paused: self.paused.load(Ordering::Acquire),
            reason: inner.reason.clone(),
            paused_at: inner.paused_at,
            consecutive_failures: inner.consecutive_failures,
            asymmetric_count: inner.asymmetric_count,
        }
    }
}

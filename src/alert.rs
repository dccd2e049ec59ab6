//! Outbound notification channel for severity-classified events.
//!
//! Delivery must never block or fail a trading path: the log alerter is
//! synchronous and infallible, the webhook alerter posts fire-and-forget
//! with a short timeout and swallows transport errors after logging them.

use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Alert severity, ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// Outbound alert transport.
#[async_trait]
pub trait Alerter: Send + Sync {
    async fn send(&self, severity: Severity, event: &str, detail: &str);
}

/// Default transport: structured log lines.
pub struct LogAlerter;

#[async_trait]
impl Alerter for LogAlerter {
    async fn send(&self, severity: Severity, event: &str, detail: &str) {
        match severity {
            Severity::Info | Severity::Medium => {
                info!(event = event, severity = %severity, "{}", detail)
            }
            Severity::High => warn!(event = event, severity = %severity, "{}", detail),
            Severity::Critical => error!(event = event, severity = %severity, "{}", detail),
        }
    }
}

/// JSON webhook transport. Posts `{severity, event, detail, ts}`.
pub struct WebhookAlerter {
    url: String,
    http: reqwest::Client,
}

impl WebhookAlerter {
    pub fn new(url: String) -> Self {
        Self {
            url,
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl Alerter for WebhookAlerter {
    async fn send(&self, severity: Severity, event: &str, detail: &str) {
        let body = json!({
            "severity": severity,
            "event": event,
            "detail": detail,
            "ts": chrono::Utc::now().to_rfc3339(),
        });
        if let Err(e) = self.http.post(&self.url).json(&body).send().await {
            warn!("alert webhook delivery failed: {}", e);
        }
    }
}

/// Fan alerts out to every configured transport.
pub struct MultiAlerter {
    sinks: Vec<Arc<dyn Alerter>>,
}

impl MultiAlerter {
    pub fn new(sinks: Vec<Arc<dyn Alerter>>) -> Self {
        Self { sinks }
    }

    /// Standard stack: logs always, webhook when configured.
    pub fn from_config(cfg: &crate::config::Config) -> Arc<dyn Alerter> {
        let mut sinks: Vec<Arc<dyn Alerter>> = vec![Arc::new(LogAlerter)];
        if let Some(url) = &cfg.alert_webhook_url {
            sinks.push(Arc::new(WebhookAlerter::new(url.clone())));
        }
        Arc::new(MultiAlerter::new(sinks))
    }
}

#[async_trait]
impl Alerter for MultiAlerter {
    async fn send(&self, severity: Severity, event: &str, detail: &str) {
        for sink in &self.sinks {
            sink.send(severity, event, detail).await;
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use tokio::sync::Mutex;

    /// Captures alerts for assertions.
    #[derive(Default)]
    pub struct CapturingAlerter {
        pub sent: Mutex<Vec<(Severity, String, String)>>,
    }

    #[async_trait]
    impl Alerter for CapturingAlerter {
        async fn send(&self, severity: Severity, event: &str, detail: &str) {
            self.sent
                .lock()
                .await
                .push((severity, event.to_string(), detail.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::CapturingAlerter;
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Info);
        assert_eq!(Severity::Critical.to_string(), "critical");
    }

    #[tokio::test]
    async fn test_multi_alerter_fans_out() {
        let a = Arc::new(CapturingAlerter::default());
        let b = Arc::new(CapturingAlerter::default());
        let multi = MultiAlerter::new(vec![a.clone(), b.clone()]);

        multi.send(Severity::High, "venue_disabled", "v2 auth failed").await;

        for sink in [a, b] {
            let sent = sink.sent.lock().await;
            assert_eq!(sent.len(), 1);
            assert_eq!(sent[0].0, Severity::High);
            assert_eq!(sent[0].1, "venue_disabled");
        }
    }
}

//! Notification relays for workflow outcomes.
//!
//! A relay turns a transition outcome into something the user sees: a log
//! line, a console banner, or a webhook message. Relays never fail; delivery
//! problems are logged and dropped.
//!
//! Relays that deliver in the background finish that work in `flush`. A
//! short-lived caller such as the CLI awaits it before its runtime shuts down.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

/// Outcome kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeKind {
    /// Transition or request succeeded
    Success,
    /// Transition or request failed
    Error,
}

impl OutcomeKind {
    /// Get the display name for this kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
        }
    }

    /// Get an icon for this kind. Prefixes the console banner.
    #[must_use]
    pub const fn icon(&self) -> &'static str {
        match self {
            Self::Success => "✓",
            Self::Error => "✗",
        }
    }

    /// Hex color sent in the webhook payload, for chat integrations that
    /// render attachment colors. The console banner does not use it.
    #[must_use]
    pub const fn color(&self) -> &'static str {
        match self {
            Self::Success => "#28a745",
            Self::Error => "#dc3545",
        }
    }
}

impl std::fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// A user-visible outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Success or error
    pub kind: OutcomeKind,

    /// Message text, shown verbatim
    pub message: String,
}

impl Outcome {
    /// Create a success outcome.
    pub fn success(message: impl Into<String>) -> Self {
        Self { kind: OutcomeKind::Success, message: message.into() }
    }

    /// Create an error outcome.
    pub fn error(message: impl Into<String>) -> Self {
        Self { kind: OutcomeKind::Error, message: message.into() }
    }

    /// Check if this is an error outcome.
    pub fn is_error(&self) -> bool {
        self.kind == OutcomeKind::Error
    }

    /// Single-line banner text.
    pub fn banner(&self) -> String {
        format!("{} {}", self.kind.icon(), self.message)
    }
}

/// Surfaces outcomes to the user.
#[async_trait]
pub trait NotificationRelay: Send + Sync {
    /// Display an outcome. Must not panic or block on I/O.
    fn notify(&self, outcome: &Outcome);

    /// Wait for deliveries started by `notify` to finish.
    async fn flush(&self) {}
}

/// Relay that writes outcomes to the tracing log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingRelay;

impl NotificationRelay for TracingRelay {
    fn notify(&self, outcome: &Outcome) {
        match outcome.kind {
            OutcomeKind::Success => tracing::info!(message = %outcome.message, "Workflow outcome"),
            OutcomeKind::Error => tracing::warn!(message = %outcome.message, "Workflow outcome"),
        }
    }
}

/// Relay that prints banners: successes to stdout, errors to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleRelay;

impl NotificationRelay for ConsoleRelay {
    fn notify(&self, outcome: &Outcome) {
        if outcome.is_error() {
            eprintln!("{}", outcome.banner());
        } else {
            println!("{}", outcome.banner());
        }
    }
}

/// Relay that records outcomes in memory.
#[derive(Debug, Default)]
pub struct MemoryRelay {
    outcomes: Mutex<Vec<Outcome>>,
}

impl MemoryRelay {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded outcomes.
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().clone()
    }

    /// The most recent outcome.
    pub fn last(&self) -> Option<Outcome> {
        self.outcomes.lock().last().cloned()
    }

    /// Forget everything recorded so far.
    pub fn clear(&self) {
        self.outcomes.lock().clear();
    }
}

impl NotificationRelay for MemoryRelay {
    fn notify(&self, outcome: &Outcome) {
        self.outcomes.lock().push(outcome.clone());
    }
}

/// Relay that posts outcomes as JSON to a webhook.
///
/// Delivery runs on the current tokio runtime; outside a runtime the outcome
/// is dropped with a warning. Deliveries are tracked until `flush` awaits them.
#[derive(Debug, Clone)]
pub struct WebhookRelay {
    client: reqwest::Client,
    url: String,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl WebhookRelay {
    /// Create a webhook relay.
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(format!("phaseflow/{}", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, url: url.into(), pending: Arc::new(Mutex::new(Vec::new())) })
    }

    /// Deliveries not yet awaited by `flush`.
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Webhook payload for an outcome.
    pub fn payload(outcome: &Outcome) -> serde_json::Value {
        serde_json::json!({
            "event": "workflow_outcome",
            "kind": outcome.kind,
            "text": outcome.message,
            "color": outcome.kind.color(),
            "is_error": outcome.is_error(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        })
    }
}

#[async_trait]
impl NotificationRelay for WebhookRelay {
    fn notify(&self, outcome: &Outcome) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(url = %self.url, "No async runtime, webhook notification dropped");
            return;
        };

        let request = self.client.post(&self.url).json(&Self::payload(outcome));
        let url = self.url.clone();
        let task = handle.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(url = %url, "Webhook notification delivered");
                }
                Ok(response) => {
                    tracing::warn!(url = %url, status = %response.status(), "Webhook rejected notification");
                }
                Err(e) => tracing::warn!(url = %url, error = %e, "Webhook notification failed"),
            }
        });

        let mut pending = self.pending.lock();
        pending.retain(|task| !task.is_finished());
        pending.push(task);
    }

    async fn flush(&self) {
        let pending = std::mem::take(&mut *self.pending.lock());
        for task in pending {
            if let Err(e) = task.await {
                tracing::warn!(url = %self.url, error = %e, "Webhook delivery task failed");
            }
        }
    }
}

/// Relay that forwards to several relays in order.
#[derive(Default)]
pub struct FanoutRelay {
    relays: Vec<Arc<dyn NotificationRelay>>,
}

impl FanoutRelay {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a relay.
    pub fn with(mut self, relay: Arc<dyn NotificationRelay>) -> Self {
        self.relays.push(relay);
        self
    }

    /// Number of relays.
    pub fn len(&self) -> usize {
        self.relays.len()
    }

    /// Check if no relays are attached.
    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }
}

#[async_trait]
impl NotificationRelay for FanoutRelay {
    fn notify(&self, outcome: &Outcome) {
        for relay in &self.relays {
            relay.notify(outcome);
        }
    }

    async fn flush(&self) {
        for relay in &self.relays {
            relay.flush().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_banner() {
        assert_eq!(Outcome::success("Phase completed").banner(), "✓ Phase completed");
        assert_eq!(Outcome::error("Network down").banner(), "✗ Network down");
    }

    #[test]
    fn test_memory_relay_records_in_order() {
        let relay = MemoryRelay::new();
        relay.notify(&Outcome::success("one"));
        relay.notify(&Outcome::error("two"));

        let outcomes = relay.outcomes();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].message, "one");
        assert!(relay.last().unwrap().is_error());

        relay.clear();
        assert!(relay.outcomes().is_empty());
    }

    #[test]
    fn test_fanout_forwards_to_all() {
        let a = Arc::new(MemoryRelay::new());
        let b = Arc::new(MemoryRelay::new());
        let fanout = FanoutRelay::new().with(a.clone()).with(b.clone());
        assert_eq!(fanout.len(), 2);

        fanout.notify(&Outcome::success("done"));
        assert_eq!(a.outcomes().len(), 1);
        assert_eq!(b.outcomes().len(), 1);
    }

    #[test]
    fn test_webhook_payload() {
        let payload = WebhookRelay::payload(&Outcome::error("Phase transition failed"));
        assert_eq!(payload["event"], "workflow_outcome");
        assert_eq!(payload["kind"], "error");
        assert_eq!(payload["is_error"], true);
        assert_eq!(payload["color"], "#dc3545");
    }

    #[test]
    fn test_webhook_outside_runtime_does_not_panic() {
        let relay = WebhookRelay::new("http://127.0.0.1:9/hook").unwrap();
        relay.notify(&Outcome::success("ignored"));
        assert_eq!(relay.pending(), 0);
    }

    #[tokio::test]
    async fn test_webhook_flush_drains_pending() {
        let relay = WebhookRelay::new("http://127.0.0.1:9/hook").unwrap();
        relay.notify(&Outcome::success("one"));
        relay.notify(&Outcome::error("two"));
        assert!(relay.pending() >= 1);

        relay.flush().await;
        assert_eq!(relay.pending(), 0);
    }

    #[tokio::test]
    async fn test_fanout_flush_reaches_webhook() {
        let webhook = Arc::new(WebhookRelay::new("http://127.0.0.1:9/hook").unwrap());
        let fanout = FanoutRelay::new().with(Arc::new(MemoryRelay::new())).with(webhook.clone());

        fanout.notify(&Outcome::success("done"));
        fanout.flush().await;
        assert_eq!(webhook.pending(), 0);
    }

    #[test]
    fn test_outcome_serde() {
        let json = serde_json::to_string(&Outcome::success("ok")).unwrap();
        assert_eq!(json, r#"{"kind":"success","message":"ok"}"#);
    }
}

//! ReminderDispatcher: delivery of a claimed escalation.
//!
//! Dispatch happens strictly after a successful claim. The scanner calls a
//! dispatcher at most once per claim and never retries; a failure is logged
//! and the claim stays committed.

use std::fmt;

use chrono::{DateTime, Utc};
use podesk_ledger::LedgerSummary;
use podesk_schemas::{Order, ReminderCategory};
use serde::Serialize;
use tracing::info;

// ---------------------------------------------------------------------------
// Escalation
// ---------------------------------------------------------------------------

/// One claimed escalation, handed to the dispatcher.
#[derive(Debug, Clone, PartialEq)]
pub struct Escalation {
    /// Snapshot of the order as seen by the scan, with the claim applied.
    pub order: Order,
    /// The category whose flag was claimed.
    pub claimed: ReminderCategory,
    /// The inferred escalation sub-type (see `escalation_kind`).
    pub kind: ReminderCategory,
    /// Present for payment escalations.
    pub ledger: Option<LedgerSummary>,
    pub at: DateTime<Utc>,
}

impl Escalation {
    pub fn message(&self) -> String {
        let o = &self.order;
        let age_h = (self.at - o.created_at).num_hours();
        match self.kind {
            ReminderCategory::Admin => format!(
                "Order {} \"{}\" ({}) has been awaiting approval for {age_h}h.",
                o.order_id, o.title, o.team
            ),
            ReminderCategory::Proforma => format!(
                "Order {} \"{}\" ({}) has no proforma attached after {age_h}h.",
                o.order_id, o.title, o.team
            ),
            ReminderCategory::Payment => {
                let remaining = self
                    .ledger
                    .map(|l| l.remaining_amount.to_string())
                    .unwrap_or_else(|| "?".to_string());
                format!(
                    "Order {} \"{}\" ({}) has a proforma but no payment after {age_h}h \
                     (remaining {remaining}).",
                    o.order_id, o.title, o.team
                )
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum DispatchError {
    /// Network or transport failure.
    Transport(String),
    /// The receiver answered with a non-success status.
    Rejected { status: u16, body: String },
    Config(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Transport(msg) => write!(f, "transport error: {msg}"),
            DispatchError::Rejected { status, body } => {
                write!(f, "dispatch rejected status={status}: {body}")
            }
            DispatchError::Config(msg) => write!(f, "config error: {msg}"),
        }
    }
}

impl std::error::Error for DispatchError {}

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

#[async_trait::async_trait]
pub trait ReminderDispatcher: Send + Sync {
    fn name(&self) -> &'static str;

    async fn dispatch(&self, escalation: &Escalation) -> Result<(), DispatchError>;
}

/// Writes escalations to the log only. Used when no webhook is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDispatcher;

#[async_trait::async_trait]
impl ReminderDispatcher for LogDispatcher {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn dispatch(&self, escalation: &Escalation) -> Result<(), DispatchError> {
        info!(
            order_id = %escalation.order.order_id,
            claimed = escalation.claimed.as_str(),
            kind = escalation.kind.as_str(),
            "{}",
            escalation.message()
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Webhook
// ---------------------------------------------------------------------------

/// Posts escalations as JSON to a chat webhook.
///
/// The URL is a secret; it is never logged.
#[derive(Clone)]
pub struct WebhookDispatcher {
    http: reqwest::Client,
    url: String,
}

impl WebhookDispatcher {
    pub fn new(url: String) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

impl fmt::Debug for WebhookDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookDispatcher")
            .field("url", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    text: String,
    order_id: &'a str,
    title: &'a str,
    team: &'a str,
    requested_by: &'a str,
    claimed: ReminderCategory,
    kind: ReminderCategory,
    status: &'static str,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ledger: Option<LedgerSummary>,
}

impl<'a> WebhookPayload<'a> {
    fn from_escalation(e: &'a Escalation) -> Self {
        Self {
            text: e.message(),
            order_id: e.order.order_id.as_str(),
            title: &e.order.title,
            team: &e.order.team,
            requested_by: &e.order.requested_by,
            claimed: e.claimed,
            kind: e.kind,
            status: e.order.status.as_str(),
            created_at: e.order.created_at,
            ledger: e.ledger,
        }
    }
}

#[async_trait::async_trait]
impl ReminderDispatcher for WebhookDispatcher {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn dispatch(&self, escalation: &Escalation) -> Result<(), DispatchError> {
        let payload = WebhookPayload::from_escalation(escalation);
        let resp = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DispatchError::Transport(e.without_url().to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(DispatchError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use httpmock::prelude::*;
    use podesk_schemas::{OrderDraft, OrderId, OrderStatus, YearMonth};

    fn escalation() -> Escalation {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 6, 0, 0).unwrap();
        let draft = OrderDraft {
            title: "Desk lamps".to_string(),
            team: "Support".to_string(),
            requested_by: "dan".to_string(),
            requested_date: created.date_naive(),
            articles: Vec::new(),
        };
        let id = OrderId::new(YearMonth::new(2025, 3).unwrap(), 1);
        let mut order = Order::from_draft(id, &draft, created);
        order.status = OrderStatus::Validated;
        Escalation {
            order,
            claimed: ReminderCategory::Proforma,
            kind: ReminderCategory::Proforma,
            ledger: None,
            at: created + Duration::hours(30),
        }
    }

    #[test]
    fn message_mentions_id_and_age() {
        let msg = escalation().message();
        assert!(msg.contains("CMD/2025/03/0001"));
        assert!(msg.contains("30h"));
        assert!(msg.contains("no proforma"));
    }

    #[tokio::test]
    async fn webhook_posts_json_payload() {
        let server = MockServer::start_async().await;
        let hook = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/hooks/desk")
                    .json_body_partial(r#"{"order_id":"CMD/2025/03/0001","kind":"proforma"}"#);
                then.status(200);
            })
            .await;

        let d = WebhookDispatcher::new(server.url("/hooks/desk"));
        d.dispatch(&escalation()).await.unwrap();
        hook.assert_async().await;
    }

    #[tokio::test]
    async fn webhook_non_success_is_rejected_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/hooks/desk");
                then.status(500).body("boom");
            })
            .await;

        let d = WebhookDispatcher::new(server.url("/hooks/desk"));
        let err = d.dispatch(&escalation()).await.unwrap_err();
        match err {
            DispatchError::Rejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}

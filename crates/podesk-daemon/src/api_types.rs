//! Request and response types for the podesk-daemon HTTP endpoints.
//!
//! Amounts travel as decimal strings and are parsed with
//! `podesk_ledger::parse_amount` in the handlers. No business logic here.

use podesk_ledger::LedgerSummary;
use podesk_runtime::ScanReport;
use podesk_schemas::Order;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// /v1/health
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub service: String,
    pub version: String,
}

// ---------------------------------------------------------------------------
// /v1/status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub daemon_uptime_secs: u64,
    pub config_hash: String,
    pub timezone: String,
    pub scan_interval_secs: u64,
    pub stale_after_hours: i64,
    pub scheduler_running: bool,
    pub stream_subscribers: usize,
    /// Report of the most recent sweep, scheduled or manual.
    pub last_scan: Option<ScanReport>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Stable machine-readable code, e.g. `ALREADY_PROCESSED`.
    pub code: String,
    pub error: String,
    /// Per-field problems for rejected drafts.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// An order plus its URL-safe id and the ledger as derived right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub url_id: String,
    pub ledger: LedgerSummary,
    pub order: Order,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        Self {
            url_id: order.order_id.url_form(),
            ledger: podesk_ledger::summarize(&order),
            order,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseRequest {
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveRequest {
    pub approver: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RejectRequest {
    pub rejecter: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub actor: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Decimal string, e.g. `"1234.56"`.
    pub amount: String,
    pub submitted_by: String,
    #[serde(default)]
    pub reference: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProformaRequest {
    pub vendor: String,
    pub amount: String,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkPaidRequest {
    pub actor: String,
}

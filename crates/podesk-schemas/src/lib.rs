//! podesk-schemas
//!
//! Persisted and wire types shared by every podesk crate. No I/O and no
//! business rules live here; transitions belong to `podesk-lifecycle` and
//! amount derivation to `podesk-ledger`.

mod ids;
mod money;

pub use ids::{IdError, OrderId, YearMonth, ORDER_ID_PREFIX};
pub use money::{Micros, MICROS_PER_UNIT};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Status enums
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Validated,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Validated => "VALIDATED",
            OrderStatus::Rejected => "REJECTED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(OrderStatus::Pending),
            "VALIDATED" => Some(OrderStatus::Validated),
            "REJECTED" => Some(OrderStatus::Rejected),
            _ => None,
        }
    }
}

/// Payment sub-status derived by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::PartiallyPaid => "PARTIALLY_PAID",
            PaymentStatus::Paid => "PAID",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNPAID" => Some(PaymentStatus::Unpaid),
            "PARTIALLY_PAID" => Some(PaymentStatus::PartiallyPaid),
            "PAID" => Some(PaymentStatus::Paid),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Escalation categories
// ---------------------------------------------------------------------------

/// One of the three independently claimed escalation categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderCategory {
    Admin,
    Payment,
    Proforma,
}

impl ReminderCategory {
    pub const ALL: [ReminderCategory; 3] = [
        ReminderCategory::Admin,
        ReminderCategory::Payment,
        ReminderCategory::Proforma,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReminderCategory::Admin => "admin",
            ReminderCategory::Payment => "payment",
            ReminderCategory::Proforma => "proforma",
        }
    }

    /// Name of the persisted boolean flag owned by this category.
    pub fn flag_name(&self) -> &'static str {
        match self {
            ReminderCategory::Admin => "admin_reminder_sent",
            ReminderCategory::Payment => "payment_reminder_sent",
            ReminderCategory::Proforma => "proforma_reminder_sent",
        }
    }

    /// `type` recorded in `delay_history`.
    pub fn history_kind(&self) -> &'static str {
        match self {
            ReminderCategory::Admin => "admin_reminder",
            ReminderCategory::Payment => "payment_reminder",
            ReminderCategory::Proforma => "proforma_reminder",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(ReminderCategory::Admin),
            "payment" => Some(ReminderCategory::Payment),
            "proforma" => Some(ReminderCategory::Proforma),
            _ => None,
        }
    }
}

/// The three at-most-once flags, one per [`ReminderCategory`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderFlags {
    pub admin_reminder_sent: bool,
    pub payment_reminder_sent: bool,
    pub proforma_reminder_sent: bool,
}

impl ReminderFlags {
    pub fn is_sent(&self, category: ReminderCategory) -> bool {
        match category {
            ReminderCategory::Admin => self.admin_reminder_sent,
            ReminderCategory::Payment => self.payment_reminder_sent,
            ReminderCategory::Proforma => self.proforma_reminder_sent,
        }
    }

    pub fn mark_sent(&mut self, category: ReminderCategory) {
        match category {
            ReminderCategory::Admin => self.admin_reminder_sent = true,
            ReminderCategory::Payment => self.payment_reminder_sent = true,
            ReminderCategory::Proforma => self.proforma_reminder_sent = true,
        }
    }
}

/// One `delay_history` audit entry, appended by a successful claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayRecord {
    #[serde(rename = "type")]
    pub kind: String,
    pub category: ReminderCategory,
    pub at: DateTime<Utc>,
}

impl DelayRecord {
    pub fn for_category(category: ReminderCategory, at: DateTime<Utc>) -> Self {
        Self {
            kind: category.history_kind().to_string(),
            category,
            at,
        }
    }
}

// ---------------------------------------------------------------------------
// Business content
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub quantity: u32,
    pub unit: String,
    pub description: String,
}

/// A vendor quotation. The first one with `validated = true` is authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Proforma {
    pub vendor: String,
    pub amount: Micros,
    pub currency: String,
    pub validated: bool,
    pub added_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub amount: Micros,
    pub submitted_at: DateTime<Utc>,
    pub submitted_by: String,
    pub reference: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub by: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rejection {
    pub by: String,
    pub at: DateTime<Utc>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deletion {
    pub by: String,
    pub at: DateTime<Utc>,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Order
// ---------------------------------------------------------------------------

/// The central persisted entity.
///
/// `total_amount`, `amount_paid`, `remaining_amount` and `payment_status`
/// are stored copies of the ledger derivation; they are only ever written
/// through `podesk_ledger::recompute`.
///
/// `reminders` and `delay_history` are owned by the conditional claim write
/// and are never persisted by a lifecycle save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub title: String,
    pub team: String,
    pub requested_by: String,
    pub requested_date: NaiveDate,

    pub status: OrderStatus,
    pub is_approved_once: bool,
    pub approval: Option<Approval>,
    pub rejection: Option<Rejection>,
    pub deleted: bool,
    pub deletion: Option<Deletion>,

    pub articles: Vec<Article>,
    pub proformas: Vec<Proforma>,
    pub payments: Vec<Payment>,

    pub total_amount: Micros,
    pub amount_paid: Micros,
    pub remaining_amount: Micros,
    pub payment_status: PaymentStatus,
    pub manual_paid: bool,

    pub reminders: ReminderFlags,
    pub delay_history: Vec<DelayRecord>,

    pub created_at: DateTime<Utc>,
    /// Last lifecycle-relevant modification.
    pub date: DateTime<Utc>,
    /// Optimistic concurrency token; bumped by every lifecycle save.
    pub version: i64,
}

impl Order {
    /// A fresh `Pending` order built from an accepted intake draft.
    pub fn from_draft(order_id: OrderId, draft: &OrderDraft, now: DateTime<Utc>) -> Self {
        Self {
            order_id,
            title: draft.title.trim().to_string(),
            team: draft.team.trim().to_string(),
            requested_by: draft.requested_by.trim().to_string(),
            requested_date: draft.requested_date,
            status: OrderStatus::Pending,
            is_approved_once: false,
            approval: None,
            rejection: None,
            deleted: false,
            deletion: None,
            articles: draft
                .articles
                .iter()
                .map(|a| Article {
                    quantity: u32::try_from(a.quantity).unwrap_or(0),
                    unit: a.unit.trim().to_string(),
                    description: a.description.trim().to_string(),
                })
                .collect(),
            proformas: Vec::new(),
            payments: Vec::new(),
            total_amount: Micros::ZERO,
            amount_paid: Micros::ZERO,
            remaining_amount: Micros::ZERO,
            payment_status: PaymentStatus::Unpaid,
            manual_paid: false,
            reminders: ReminderFlags::default(),
            delay_history: Vec::new(),
            created_at: now,
            date: now,
            version: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Intake
// ---------------------------------------------------------------------------

/// A draft line item as supplied by an external intake workflow.
///
/// `quantity` is signed so that malformed input reaches validation instead
/// of failing deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftArticle {
    pub quantity: i64,
    pub unit: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderDraft {
    pub title: String,
    pub team: String,
    pub requested_by: String,
    pub requested_date: NaiveDate,
    pub articles: Vec<DraftArticle>,
}

// ---------------------------------------------------------------------------
// Post-commit events
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderEventKind {
    Created,
    Updated,
    Escalated,
}

impl OrderEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderEventKind::Created => "created",
            OrderEventKind::Updated => "updated",
            OrderEventKind::Escalated => "escalated",
        }
    }
}

/// Emitted after every successful persistence of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderEvent {
    pub kind: OrderEventKind,
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub deleted: bool,
    pub version: i64,
    /// Set for `Escalated` events.
    pub category: Option<ReminderCategory>,
    pub at: DateTime<Utc>,
}

impl OrderEvent {
    pub fn for_order(kind: OrderEventKind, order: &Order, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            order_id: order.order_id.clone(),
            status: order.status,
            deleted: order.deleted,
            version: order.version,
            category: None,
            at,
        }
    }
}

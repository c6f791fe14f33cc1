//! Postgres implementations of [`OrderRepository`] and [`SequenceStore`].
//!
//! Flag names are never taken from callers: every dynamic column comes from
//! [`ReminderCategory::flag_name`], a closed set.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use podesk_lifecycle::LifecycleEvent;
use podesk_schemas::{
    Approval, Article, DelayRecord, Deletion, Micros, Order, OrderEvent, OrderEventKind, OrderId,
    OrderStatus, Payment, PaymentStatus, Proforma, Rejection, ReminderCategory, ReminderFlags,
    YearMonth,
};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{debug, trace};

use crate::events::EventBus;
use crate::repo::{OrderRepository, SequenceError, SequenceStore, StalePredicate};

const ORDER_COLUMNS: &str = r#"
  order_id, title, team, requested_by, requested_date,
  status, is_approved_once, approval, rejection, deleted, deletion,
  articles, proformas, payments,
  total_amount_micros, amount_paid_micros, remaining_amount_micros, payment_status, manual_paid,
  admin_reminder_sent, payment_reminder_sent, proforma_reminder_sent, delay_history,
  created_at_utc, date_utc, version
"#;

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn row_to_order(row: &PgRow) -> Result<Order> {
    let order_id: String = row.try_get("order_id")?;
    let status: String = row.try_get("status")?;
    let payment_status: String = row.try_get("payment_status")?;
    let requested_date: NaiveDate = row.try_get("requested_date")?;

    let approval: Option<Json<Approval>> = row.try_get("approval")?;
    let rejection: Option<Json<Rejection>> = row.try_get("rejection")?;
    let deletion: Option<Json<Deletion>> = row.try_get("deletion")?;
    let Json(articles): Json<Vec<Article>> = row.try_get("articles")?;
    let Json(proformas): Json<Vec<Proforma>> = row.try_get("proformas")?;
    let Json(payments): Json<Vec<Payment>> = row.try_get("payments")?;
    let Json(delay_history): Json<Vec<DelayRecord>> = row.try_get("delay_history")?;

    let created_at: DateTime<Utc> = row.try_get("created_at_utc")?;
    let date: DateTime<Utc> = row.try_get("date_utc")?;

    Ok(Order {
        order_id: OrderId::parse(&order_id)
            .with_context(|| format!("bad order_id row {order_id}"))?,
        title: row.try_get("title")?,
        team: row.try_get("team")?,
        requested_by: row.try_get("requested_by")?,
        requested_date,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| anyhow!("invalid order status: {status}"))?,
        is_approved_once: row.try_get("is_approved_once")?,
        approval: approval.map(|j| j.0),
        rejection: rejection.map(|j| j.0),
        deleted: row.try_get("deleted")?,
        deletion: deletion.map(|j| j.0),
        articles,
        proformas,
        payments,
        total_amount: Micros::new(row.try_get("total_amount_micros")?),
        amount_paid: Micros::new(row.try_get("amount_paid_micros")?),
        remaining_amount: Micros::new(row.try_get("remaining_amount_micros")?),
        payment_status: PaymentStatus::parse(&payment_status)
            .ok_or_else(|| anyhow!("invalid payment status: {payment_status}"))?,
        manual_paid: row.try_get("manual_paid")?,
        reminders: ReminderFlags {
            admin_reminder_sent: row.try_get("admin_reminder_sent")?,
            payment_reminder_sent: row.try_get("payment_reminder_sent")?,
            proforma_reminder_sent: row.try_get("proforma_reminder_sent")?,
        },
        delay_history,
        created_at,
        date,
        version: row.try_get("version")?,
    })
}

/// Extra candidate condition per category, on top of status/age/flag.
fn candidate_condition(category: ReminderCategory) -> &'static str {
    match category {
        ReminderCategory::Admin => "true",
        ReminderCategory::Payment => {
            "jsonb_array_length(payments) = 0 and jsonb_array_length(proformas) > 0"
        }
        ReminderCategory::Proforma => "jsonb_array_length(proformas) = 0",
    }
}

async fn insert_event(tx: &mut Transaction<'_, Postgres>, event: &OrderEvent) -> Result<()> {
    let payload = serde_json::to_value(event).context("serialize order event")?;
    sqlx::query(
        r#"
        insert into order_events (order_id, kind, payload, created_at_utc)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(event.order_id.as_str())
    .bind(event.kind.as_str())
    .bind(payload)
    .bind(event.at)
    .execute(&mut **tx)
    .await
    .context("insert order_events failed")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// PgOrderRepository
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
    bus: EventBus,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool, bus: EventBus) -> Self {
        Self { pool, bus }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Number of outbox rows recorded for one order (oldest first is implied
    /// by `event_id`).
    pub async fn count_events(&self, order_id: &OrderId) -> Result<i64> {
        let (n,): (i64,) =
            sqlx::query_as("select count(*)::bigint from order_events where order_id = $1")
                .bind(order_id.as_str())
                .fetch_one(&self.pool)
                .await
                .context("count_events failed")?;
        Ok(n)
    }
}

#[async_trait::async_trait]
impl OrderRepository for PgOrderRepository {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut tx = self.pool.begin().await.context("begin insert tx")?;

        sqlx::query(
            r#"
            insert into orders (
              order_id, title, team, requested_by, requested_date,
              status, is_approved_once, approval, rejection, deleted, deletion,
              articles, proformas, payments,
              total_amount_micros, amount_paid_micros, remaining_amount_micros,
              payment_status, manual_paid,
              admin_reminder_sent, payment_reminder_sent, proforma_reminder_sent, delay_history,
              created_at_utc, date_utc, version
            ) values (
              $1, $2, $3, $4, $5,
              $6, $7, $8, $9, $10, $11,
              $12, $13, $14,
              $15, $16, $17,
              $18, $19,
              $20, $21, $22, $23,
              $24, $25, $26
            )
            "#,
        )
        .bind(order.order_id.as_str())
        .bind(&order.title)
        .bind(&order.team)
        .bind(&order.requested_by)
        .bind(order.requested_date)
        .bind(order.status.as_str())
        .bind(order.is_approved_once)
        .bind(order.approval.as_ref().map(Json))
        .bind(order.rejection.as_ref().map(Json))
        .bind(order.deleted)
        .bind(order.deletion.as_ref().map(Json))
        .bind(Json(&order.articles))
        .bind(Json(&order.proformas))
        .bind(Json(&order.payments))
        .bind(order.total_amount.raw())
        .bind(order.amount_paid.raw())
        .bind(order.remaining_amount.raw())
        .bind(order.payment_status.as_str())
        .bind(order.manual_paid)
        .bind(order.reminders.admin_reminder_sent)
        .bind(order.reminders.payment_reminder_sent)
        .bind(order.reminders.proforma_reminder_sent)
        .bind(Json(&order.delay_history))
        .bind(order.created_at)
        .bind(order.date)
        .bind(order.version)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("insert order {} failed", order.order_id))?;

        let event = OrderEvent::for_order(OrderEventKind::Created, order, order.created_at);
        insert_event(&mut tx, &event).await?;
        tx.commit().await.context("commit insert tx")?;

        self.bus.publish(event);
        Ok(())
    }

    async fn find_by_id(&self, order_id: &OrderId) -> Result<Option<Order>> {
        let sql = format!("select {ORDER_COLUMNS} from orders where order_id = $1");
        let row = sqlx::query(&sql)
            .bind(order_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .context("find_by_id failed")?;
        row.as_ref().map(row_to_order).transpose()
    }

    async fn find_by_status(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let sql = format!(
            "select {ORDER_COLUMNS} from orders \
             where ($1::text is null or status = $1) \
             order by created_at_utc asc, order_id asc"
        );
        let rows = sqlx::query(&sql)
            .bind(status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await
            .context("find_by_status failed")?;
        rows.iter().map(row_to_order).collect()
    }

    async fn find_candidates(&self, predicate: &StalePredicate) -> Result<Vec<Order>> {
        let flag = predicate.category.flag_name();
        let extra = candidate_condition(predicate.category);
        let sql = format!(
            "select {ORDER_COLUMNS} from orders \
             where deleted = false \
               and status = $1 \
               and created_at_utc <= $2 \
               and {flag} = false \
               and {extra} \
             order by created_at_utc asc, order_id asc"
        );
        let rows = sqlx::query(&sql)
            .bind(predicate.status().as_str())
            .bind(predicate.created_before)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("find_candidates({}) failed", predicate.category.as_str()))?;
        rows.iter().map(row_to_order).collect()
    }

    async fn conditional_claim(
        &self,
        order_id: &OrderId,
        category: ReminderCategory,
        record: &DelayRecord,
    ) -> Result<u64> {
        let flag = category.flag_name();
        let sql = format!(
            r#"
            update orders
               set {flag} = true,
                   delay_history = delay_history || $2
             where order_id = $1
               and {flag} = false
            returning status, deleted, version
            "#
        );

        let mut tx = self.pool.begin().await.context("begin claim tx")?;
        let row = sqlx::query(&sql)
            .bind(order_id.as_str())
            .bind(Json(vec![record]))
            .fetch_optional(&mut *tx)
            .await
            .with_context(|| format!("conditional_claim({order_id}, {flag}) failed"))?;

        let Some(row) = row else {
            tx.rollback().await.context("rollback claim tx")?;
            trace!(order_id = %order_id, category = category.as_str(), "claim matched 0 rows");
            return Ok(0);
        };

        let status: String = row.try_get("status")?;
        let event = OrderEvent {
            kind: OrderEventKind::Escalated,
            order_id: order_id.clone(),
            status: OrderStatus::parse(&status)
                .ok_or_else(|| anyhow!("invalid order status: {status}"))?,
            deleted: row.try_get("deleted")?,
            version: row.try_get("version")?,
            category: Some(category),
            at: record.at,
        };
        insert_event(&mut tx, &event).await?;
        tx.commit().await.context("commit claim tx")?;

        self.bus.publish(event);
        Ok(1)
    }

    async fn save_if_version(&self, order: &Order, expected_version: i64) -> Result<bool> {
        let mut tx = self.pool.begin().await.context("begin save tx")?;

        let res = sqlx::query(
            r#"
            update orders
               set title = $3,
                   team = $4,
                   requested_by = $5,
                   requested_date = $6,
                   status = $7,
                   is_approved_once = $8,
                   approval = $9,
                   rejection = $10,
                   deleted = $11,
                   deletion = $12,
                   articles = $13,
                   proformas = $14,
                   payments = $15,
                   total_amount_micros = $16,
                   amount_paid_micros = $17,
                   remaining_amount_micros = $18,
                   payment_status = $19,
                   manual_paid = $20,
                   date_utc = $21,
                   version = version + 1
             where order_id = $1
               and version = $2
            "#,
        )
        .bind(order.order_id.as_str())
        .bind(expected_version)
        .bind(&order.title)
        .bind(&order.team)
        .bind(&order.requested_by)
        .bind(order.requested_date)
        .bind(order.status.as_str())
        .bind(order.is_approved_once)
        .bind(order.approval.as_ref().map(Json))
        .bind(order.rejection.as_ref().map(Json))
        .bind(order.deleted)
        .bind(order.deletion.as_ref().map(Json))
        .bind(Json(&order.articles))
        .bind(Json(&order.proformas))
        .bind(Json(&order.payments))
        .bind(order.total_amount.raw())
        .bind(order.amount_paid.raw())
        .bind(order.remaining_amount.raw())
        .bind(order.payment_status.as_str())
        .bind(order.manual_paid)
        .bind(order.date)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("save_if_version({}) failed", order.order_id))?;

        if res.rows_affected() != 1 {
            tx.rollback().await.context("rollback save tx")?;
            debug!(order_id = %order.order_id, expected_version, "version check lost");
            return Ok(false);
        }

        let mut saved = order.clone();
        saved.version = expected_version + 1;
        let event = OrderEvent::for_order(OrderEventKind::Updated, &saved, order.date);
        insert_event(&mut tx, &event).await?;
        tx.commit().await.context("commit save tx")?;

        self.bus.publish(event);
        Ok(true)
    }

    async fn append_payment(&self, order_id: &OrderId, payment: &Payment) -> Result<Option<Order>> {
        let mut tx = self.pool.begin().await.context("begin payment tx")?;

        let sql = format!("select {ORDER_COLUMNS} from orders where order_id = $1 for update");
        let row = sqlx::query(&sql)
            .bind(order_id.as_str())
            .fetch_optional(&mut *tx)
            .await
            .context("lock order for payment failed")?;
        let Some(row) = row else {
            tx.rollback().await.context("rollback payment tx")?;
            return Ok(None);
        };

        let mut order = row_to_order(&row)?;
        let event = LifecycleEvent::RecordPayment {
            payment: payment.clone(),
        };
        if let Err(e) = podesk_lifecycle::apply(&mut order, &event, payment.submitted_at) {
            tx.rollback().await.context("rollback payment tx")?;
            return Err(e.into());
        }
        order.version += 1;

        sqlx::query(
            r#"
            update orders
               set payments = $2,
                   total_amount_micros = $3,
                   amount_paid_micros = $4,
                   remaining_amount_micros = $5,
                   payment_status = $6,
                   date_utc = $7,
                   version = $8
             where order_id = $1
            "#,
        )
        .bind(order_id.as_str())
        .bind(Json(&order.payments))
        .bind(order.total_amount.raw())
        .bind(order.amount_paid.raw())
        .bind(order.remaining_amount.raw())
        .bind(order.payment_status.as_str())
        .bind(order.date)
        .bind(order.version)
        .execute(&mut *tx)
        .await
        .context("append_payment update failed")?;

        let event = OrderEvent::for_order(OrderEventKind::Updated, &order, order.date);
        insert_event(&mut tx, &event).await?;
        tx.commit().await.context("commit payment tx")?;

        self.bus.publish(event);
        Ok(Some(order))
    }
}

// ---------------------------------------------------------------------------
// PgSequenceStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PgSequenceStore {
    pool: PgPool,
}

impl PgSequenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Serialization failure and deadlock are retryable; everything else is not.
fn classify(err: sqlx::Error) -> SequenceError {
    if let sqlx::Error::Database(db) = &err {
        if matches!(db.code().as_deref(), Some("40001") | Some("40P01")) {
            return SequenceError::Conflict(db.message().to_string());
        }
    }
    SequenceError::Store(anyhow::Error::new(err).context("sequence increment failed"))
}

#[async_trait::async_trait]
impl SequenceStore for PgSequenceStore {
    async fn increment(&self, period: &YearMonth) -> std::result::Result<i64, SequenceError> {
        // Single statement: Postgres serializes concurrent upserts on the
        // primary key, so no two callers can observe the same value.
        let (n,): (i64,) = sqlx::query_as(
            r#"
            insert into sequence_counters (year_month, current_number)
            values ($1, 1)
            on conflict (year_month) do update
               set current_number = sequence_counters.current_number + 1,
                   updated_at_utc = now()
            returning current_number
            "#,
        )
        .bind(period.key())
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        Ok(n)
    }

    async fn current(&self, period: &YearMonth) -> Result<Option<i64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("select current_number from sequence_counters where year_month = $1")
                .bind(period.key())
                .fetch_optional(&self.pool)
                .await
                .context("sequence current failed")?;
        Ok(row.map(|(n,)| n))
    }
}

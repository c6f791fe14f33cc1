//! podesk-db
//!
//! Persistence for orders and per-period sequence counters.
//!
//! The engine talks to storage through two traits, [`OrderRepository`] and
//! [`SequenceStore`]. Postgres implementations live in [`pg`]; in-memory
//! ones used by tests live in `podesk-testkit`.
//!
//! Every successful write publishes an [`OrderEvent`](podesk_schemas::OrderEvent)
//! on the [`EventBus`] after commit. The Postgres backend also appends the
//! same event to the `order_events` table inside the write transaction.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod events;
pub mod pg;
mod repo;

pub use events::{EventBus, DEFAULT_BUS_CAPACITY};
pub use pg::{PgOrderRepository, PgSequenceStore};
pub use repo::{OrderRepository, SequenceError, SequenceStore, StalePredicate};

pub const ENV_DB_URL: &str = "PODESK_DATABASE_URL";

/// Connect to Postgres using PODESK_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='orders'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok,
        has_orders_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_orders_table: bool,
}

/// Marker error for operations addressed at an order id that does not exist.
///
/// Carried inside `anyhow::Error`; callers test for it with
/// `err.downcast_ref::<OrderNotFound>()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderNotFound(pub String);

impl std::fmt::Display for OrderNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "order not found: {}", self.0)
    }
}

impl std::error::Error for OrderNotFound {}

//! Command handler modules for podesk-cli.
//!
//! Shared wiring (config loading, desk construction) lives here.
//! Command-specific logic lives in the submodules.

pub mod order;
pub mod scan;

use std::sync::Arc;

use anyhow::Result;
use podesk_config::secrets::resolve_secrets;
use podesk_config::{report_unused_keys, ConfigSurface, DeskConfig, LoadedConfig, UnusedKeyPolicy};
use podesk_db::{EventBus, OrderRepository, PgOrderRepository, PgSequenceStore};
use podesk_runtime::{
    Calendar, Clock, DelayScanner, LogDispatcher, OrderDesk, ReminderDispatcher, SequenceAllocator,
    SystemClock, WebhookDispatcher,
};
use podesk_schemas::{Order, OrderId};

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Load `--config` paths, or PODESK_CONFIG when none were given.
pub fn load_config(config_paths: &[String]) -> Result<(LoadedConfig, DeskConfig)> {
    let loaded = if config_paths.is_empty() {
        podesk_config::load_from_env()?
    } else {
        let refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
        podesk_config::load_layered_yaml(&refs)?
    };

    let report = report_unused_keys(
        ConfigSurface::Cli,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !report.is_clean() {
        eprintln!(
            "WARN: CONFIG_UNUSED_KEYS surface=cli unused_leaf_keys={}",
            report.unused_leaf_pointers.len()
        );
        for p in report.unused_leaf_pointers.iter().take(50) {
            eprintln!("  unused={}", p);
        }
    }

    let desk = loaded.desk()?;
    Ok((loaded, desk))
}

pub fn parse_order_id(raw: &str) -> Result<OrderId> {
    OrderId::parse(raw).map_err(|e| anyhow::anyhow!("invalid --id: {e}"))
}

/// Postgres-backed desk and scanner built from the effective config.
pub struct Wiring {
    pub desk: OrderDesk,
    pub scanner: DelayScanner,
}

pub async fn connect(cfg: &DeskConfig) -> Result<Wiring> {
    let pool = podesk_db::connect_from_env().await?;

    let repo: Arc<dyn OrderRepository> = Arc::new(PgOrderRepository::new(
        pool.clone(),
        EventBus::default(),
    ));
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let allocator = SequenceAllocator::with_max_attempts(
        Arc::new(PgSequenceStore::new(pool)),
        cfg.allocator_max_attempts,
    );
    let desk = OrderDesk::new(
        repo.clone(),
        allocator,
        clock.clone(),
        Calendar::new(cfg.timezone),
    );

    let secrets = resolve_secrets(cfg)?;
    let dispatcher: Arc<dyn ReminderDispatcher> = match secrets.webhook_url {
        Some(url) => Arc::new(WebhookDispatcher::new(url)),
        None => Arc::new(LogDispatcher),
    };
    let scanner = DelayScanner::new(repo, dispatcher, clock)
        .with_stale_after(chrono::Duration::hours(cfg.scanner.stale_after_hours));

    Ok(Wiring { desk, scanner })
}

/// `key=value` lines, one per field, matching the rest of the CLI output.
pub fn print_order(o: &Order) {
    println!("order_id={}", o.order_id);
    println!("title={}", o.title);
    println!("team={}", o.team);
    println!("requested_by={}", o.requested_by);
    println!("requested_date={}", o.requested_date);
    println!("status={}", o.status.as_str());
    println!("deleted={}", o.deleted);
    println!("articles={}", o.articles.len());
    println!("proformas={}", o.proformas.len());
    println!("payments={}", o.payments.len());
    println!("total_amount={}", o.total_amount);
    println!("amount_paid={}", o.amount_paid);
    println!("remaining_amount={}", o.remaining_amount);
    println!("payment_status={}", o.payment_status.as_str());
    println!("admin_reminder_sent={}", o.reminders.admin_reminder_sent);
    println!("payment_reminder_sent={}", o.reminders.payment_reminder_sent);
    println!("proforma_reminder_sent={}", o.reminders.proforma_reminder_sent);
    println!("created_at_utc={}", o.created_at.to_rfc3339());
    println!("updated_at_utc={}", o.date.to_rfc3339());
    println!("version={}", o.version);
}

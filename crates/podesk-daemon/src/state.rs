//! Shared runtime state for podesk-daemon.
//!
//! Handlers receive `State<Arc<AppState>>` from Axum. The desk, scanner and
//! bus are built in `main.rs` (or by tests) and handed in here.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use podesk_db::EventBus;
use podesk_lifecycle::{DraftParser, LineDraftParser};
use podesk_runtime::{DelayScanner, OrderDesk, ScanReport};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// BuildInfo / DeskInfo
// ---------------------------------------------------------------------------

/// Static build metadata included in health responses.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BuildInfo {
    pub service: &'static str,
    pub version: &'static str,
}

/// Effective configuration facts surfaced by GET /v1/status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeskInfo {
    pub config_hash: String,
    pub timezone: String,
    pub scan_interval_secs: u64,
    pub stale_after_hours: i64,
}

impl Default for DeskInfo {
    fn default() -> Self {
        Self {
            config_hash: String::new(),
            timezone: podesk_runtime::DEFAULT_TIMEZONE.name().to_string(),
            scan_interval_secs: 3600,
            stale_after_hours: podesk_runtime::DEFAULT_STALE_AFTER_HOURS,
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

pub struct AppState {
    pub desk: Arc<OrderDesk>,
    pub scanner: Arc<DelayScanner>,
    /// Post-commit order events; the SSE stream subscribes here.
    pub bus: EventBus,
    pub parser: Arc<dyn DraftParser>,
    pub build: BuildInfo,
    pub info: DeskInfo,
    pub last_scan: RwLock<Option<ScanReport>>,
    scheduler_started: AtomicBool,
}

impl AppState {
    pub fn new(
        desk: Arc<OrderDesk>,
        scanner: Arc<DelayScanner>,
        bus: EventBus,
        info: DeskInfo,
    ) -> Self {
        Self {
            desk,
            scanner,
            bus,
            parser: Arc::new(LineDraftParser),
            build: BuildInfo {
                service: "podesk-daemon",
                version: env!("CARGO_PKG_VERSION"),
            },
            info,
            last_scan: RwLock::new(None),
            scheduler_started: AtomicBool::new(false),
        }
    }

    pub fn with_parser(mut self, parser: Arc<dyn DraftParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn scheduler_running(&self) -> bool {
        self.scheduler_started.load(Ordering::SeqCst)
    }

    /// Run one sweep and remember its report.
    pub async fn run_scan(&self) -> ScanReport {
        let report = self.scanner.scan_once().await;
        info!(
            claimed = report.total_claimed(),
            dispatched = report.total_dispatched(),
            admin = report.admin.claimed,
            payment = report.payment.claimed,
            proforma = report.proforma.claimed,
            "delay sweep finished"
        );
        *self.last_scan.write().await = Some(report.clone());
        report
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Monotonically increasing uptime since first call (process lifetime).
pub fn uptime_secs() -> u64 {
    static START: std::sync::OnceLock<std::time::Instant> = std::sync::OnceLock::new();
    START
        .get_or_init(std::time::Instant::now)
        .elapsed()
        .as_secs()
}

/// Spawn the periodic delay sweep.
///
/// Registers at most once per `AppState`: a second call logs a warning and
/// returns `None`. The first tick fires one full `interval` after start,
/// and ticks missed while a sweep is still running are skipped.
pub fn spawn_scan_tick(state: Arc<AppState>, interval: Duration) -> Option<JoinHandle<()>> {
    if state.scheduler_started.swap(true, Ordering::SeqCst) {
        warn!("delay sweep scheduler already registered; ignoring");
        return None;
    }
    info!(interval_secs = interval.as_secs(), "delay sweep scheduler registered");

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            state.run_scan().await;
        }
    }))
}

//! podesk-daemon entry point.
//!
//! Thin: sets up tracing, loads config, wires Postgres into the desk and
//! scanner, registers the sweep scheduler once, and serves HTTP. Handlers
//! live in `routes.rs`; shared state in `state.rs`.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use podesk_config::secrets::resolve_secrets;
use podesk_config::{report_unused_keys, ConfigSurface, UnusedKeyPolicy};
use podesk_daemon::{routes, state};
use podesk_db::{EventBus, OrderRepository, PgOrderRepository, PgSequenceStore};
use podesk_runtime::{
    Calendar, Clock, DelayScanner, LogDispatcher, OrderDesk, ReminderDispatcher, SequenceAllocator,
    SystemClock, WebhookDispatcher,
};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let loaded = podesk_config::load_from_env().context("config load failed")?;
    let unused = report_unused_keys(
        ConfigSurface::Daemon,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )?;
    if !unused.is_clean() {
        warn!(keys = ?unused.unused_leaf_pointers, "config contains keys the daemon never reads");
    }
    let cfg = loaded.desk()?;
    let secrets = resolve_secrets(&cfg)?;
    info!(config_hash = %loaded.config_hash, timezone = cfg.timezone.name(), "config loaded");

    let pool = podesk_db::connect_from_env().await?;
    podesk_db::migrate(&pool).await?;

    let bus = EventBus::default();
    let repo: Arc<dyn OrderRepository> =
        Arc::new(PgOrderRepository::new(pool.clone(), bus.clone()));
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

    let dispatcher: Arc<dyn ReminderDispatcher> = match secrets.webhook_url {
        Some(url) => Arc::new(WebhookDispatcher::new(url)),
        None => Arc::new(LogDispatcher),
    };
    info!(dispatcher = dispatcher.name(), "escalation dispatcher selected");
    let scanner = DelayScanner::new(repo, dispatcher, clock)
        .with_stale_after(chrono::Duration::hours(cfg.scanner.stale_after_hours));

    let info = state::DeskInfo {
        config_hash: loaded.config_hash.clone(),
        timezone: cfg.timezone.name().to_string(),
        scan_interval_secs: cfg.scanner.interval_secs,
        stale_after_hours: cfg.scanner.stale_after_hours,
    };
    let shared = Arc::new(state::AppState::new(Arc::new(desk), Arc::new(scanner), bus, info));

    // The only place the sweep is scheduled.
    state::spawn_scan_tick(
        Arc::clone(&shared),
        Duration::from_secs(cfg.scanner.interval_secs),
    );

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or(cfg.daemon_addr);
    info!("podesk-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("PODESK_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "ctrl-c handler failed; shutting down");
    }
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}

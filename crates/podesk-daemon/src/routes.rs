//! Axum router and all HTTP handlers for podesk-daemon.
//!
//! `build_router` is the single entry point; `main.rs` calls it and attaches
//! middleware layers. Orders are addressed by the URL-safe id form
//! `CMD-YYYY-MM-NNNN`; the slash form is accepted too when percent-encoded.
//!
//! Status mapping:
//! - conflicts (`AlreadyProcessed`, `AlreadyDeleted`, write contention) → 409
//! - validation failures (draft, amount, event fields) → 400
//! - unknown order → 404

use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::{Stream, StreamExt};
use podesk_db::OrderNotFound;
use podesk_ledger::{parse_amount, AmountError};
use podesk_lifecycle::{IntakeError, LifecycleError};
use podesk_runtime::{Outcome, WriteContention};
use podesk_schemas::{Order, OrderDraft, OrderEvent, OrderId, OrderStatus};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{error, info};

use crate::{
    api_types::{
        ApproveRequest, DeleteRequest, ErrorResponse, HealthResponse, ListQuery, MarkPaidRequest,
        OrderListResponse, OrderResponse, ParseRequest, PaymentRequest, ProformaRequest,
        RejectRequest, StatusResponse,
    },
    state::{uptime_secs, AppState},
};

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Build the complete application router wired to the given shared state.
///
/// Middleware layers (CORS, tracing) are **not** applied here; `main.rs`
/// attaches them after this call so tests can use the bare router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/status", get(status_handler))
        .route("/v1/stream", get(stream))
        .route("/v1/scan", post(scan))
        .route("/v1/orders", get(list_orders).post(create_order))
        .route("/v1/orders/parse", post(parse_order))
        .route("/v1/orders/:id", get(get_order))
        .route("/v1/orders/:id/approve", post(approve))
        .route("/v1/orders/:id/reject", post(reject))
        .route("/v1/orders/:id/delete", post(soft_delete))
        .route("/v1/orders/:id/payments", post(record_payment))
        .route("/v1/orders/:id/proformas", post(add_proforma))
        .route("/v1/orders/:id/proformas/:idx/validate", post(validate_proforma))
        .route("/v1/orders/:id/paid", post(mark_paid))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Handler error: a status code plus the JSON body sent to the client.
#[derive(Debug)]
pub(crate) struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorResponse {
                code: code.to_string(),
                error: error.into(),
                details: Vec::new(),
            },
        }
    }

    fn bad_request(code: &str, error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, error)
    }

    fn lifecycle(e: &LifecycleError) -> Self {
        let status = if e.is_conflict() {
            StatusCode::CONFLICT
        } else {
            StatusCode::BAD_REQUEST
        };
        Self::new(status, e.code(), e.to_string())
    }

    fn intake(errors: &[IntakeError]) -> Self {
        let mut err = Self::bad_request("INVALID_DRAFT", podesk_lifecycle::describe(errors));
        err.body.details = errors.iter().map(ToString::to_string).collect();
        err
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        if let Some(nf) = e.downcast_ref::<OrderNotFound>() {
            return Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", nf.to_string());
        }
        if let Some(le) = e.downcast_ref::<LifecycleError>() {
            return Self::lifecycle(le);
        }
        if let Some(wc) = e.downcast_ref::<WriteContention>() {
            return Self::new(StatusCode::CONFLICT, "WRITE_CONTENTION", wc.to_string());
        }
        if let Some(ae) = e.downcast_ref::<AmountError>() {
            return Self::bad_request("INVALID_AMOUNT", ae.to_string());
        }
        error!(error = %format!("{e:#}"), "request failed");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL",
            "internal error",
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn order_id(raw: &str) -> ApiResult<OrderId> {
    OrderId::parse(raw).map_err(|e| ApiError::bad_request("INVALID_ORDER_ID", e.to_string()))
}

fn amount(raw: &str) -> ApiResult<podesk_schemas::Micros> {
    parse_amount(raw).map_err(|e| ApiError::bad_request("INVALID_AMOUNT", e.to_string()))
}

/// `Applied` → 200 with the order; `NoOp` → 409 with the conflict code.
fn outcome(o: Outcome<Order>) -> ApiResult<Json<OrderResponse>> {
    match o {
        Outcome::Applied(order) => Ok(Json(order.into())),
        Outcome::NoOp(e) => Err(ApiError::lifecycle(&e)),
    }
}

// ---------------------------------------------------------------------------
// GET /v1/health
// ---------------------------------------------------------------------------

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service.to_string(),
            version: st.build.version.to_string(),
        }),
    )
}

// ---------------------------------------------------------------------------
// GET /v1/status
// ---------------------------------------------------------------------------

pub(crate) async fn status_handler(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    let last_scan = st.last_scan.read().await.clone();
    (
        StatusCode::OK,
        Json(StatusResponse {
            daemon_uptime_secs: uptime_secs(),
            config_hash: st.info.config_hash.clone(),
            timezone: st.info.timezone.clone(),
            scan_interval_secs: st.info.scan_interval_secs,
            stale_after_hours: st.info.stale_after_hours,
            scheduler_running: st.scheduler_running(),
            stream_subscribers: st.bus.subscriber_count(),
            last_scan,
        }),
    )
}

// ---------------------------------------------------------------------------
// POST /v1/scan
// ---------------------------------------------------------------------------

pub(crate) async fn scan(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    info!("scan requested");
    (StatusCode::OK, Json(st.run_scan().await))
}

// ---------------------------------------------------------------------------
// Orders: intake and reads
// ---------------------------------------------------------------------------

pub(crate) async fn create_order(
    State(st): State<Arc<AppState>>,
    Json(draft): Json<OrderDraft>,
) -> ApiResult<(StatusCode, Json<OrderResponse>)> {
    let valid = st
        .desk
        .validate(draft)
        .map_err(|errs| ApiError::intake(&errs))?;
    let order = st.desk.create_order(valid).await?;
    Ok((StatusCode::CREATED, Json(order.into())))
}

/// Parse free text into a draft. Nothing is persisted.
pub(crate) async fn parse_order(
    State(st): State<Arc<AppState>>,
    Json(req): Json<ParseRequest>,
) -> impl IntoResponse {
    let parsed = st.parser.parse_draft(&req.text).await;
    (StatusCode::OK, Json(parsed))
}

pub(crate) async fn list_orders(
    State(st): State<Arc<AppState>>,
    Query(q): Query<ListQuery>,
) -> ApiResult<Json<OrderListResponse>> {
    let status = match q.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(s) => Some(OrderStatus::parse(s).ok_or_else(|| {
            ApiError::bad_request("INVALID_STATUS", format!("unknown status '{s}'"))
        })?),
    };
    let orders = st.desk.list_orders(status).await?;
    Ok(Json(OrderListResponse {
        orders: orders.into_iter().map(OrderResponse::from).collect(),
    }))
}

pub(crate) async fn get_order(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<OrderResponse>> {
    let id = order_id(&id)?;
    let order = st
        .desk
        .get_order(&id)
        .await?
        .ok_or_else(|| {
            ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("order not found: {id}"),
            )
        })?;
    Ok(Json(order.into()))
}

// ---------------------------------------------------------------------------
// Orders: transitions
// ---------------------------------------------------------------------------

pub(crate) async fn approve(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ApproveRequest>,
) -> ApiResult<Json<OrderResponse>> {
    let id = order_id(&id)?;
    outcome(st.desk.approve(&id, &req.approver).await?)
}

pub(crate) async fn reject(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<Json<OrderResponse>> {
    let id = order_id(&id)?;
    outcome(st.desk.reject(&id, &req.rejecter, &req.reason).await?)
}

pub(crate) async fn soft_delete(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<DeleteRequest>,
) -> ApiResult<Json<OrderResponse>> {
    let id = order_id(&id)?;
    outcome(st.desk.soft_delete(&id, &req.actor, &req.reason).await?)
}

pub(crate) async fn record_payment(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<PaymentRequest>,
) -> ApiResult<Json<OrderResponse>> {
    let id = order_id(&id)?;
    let amount = amount(&req.amount)?;
    let order = st
        .desk
        .record_payment(&id, amount, &req.submitted_by, req.reference, req.note)
        .await?;
    Ok(Json(order.into()))
}

pub(crate) async fn add_proforma(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ProformaRequest>,
) -> ApiResult<Json<OrderResponse>> {
    let id = order_id(&id)?;
    let amount = amount(&req.amount)?;
    outcome(st.desk.add_proforma(&id, &req.vendor, amount, &req.currency).await?)
}

pub(crate) async fn validate_proforma(
    State(st): State<Arc<AppState>>,
    Path((id, idx)): Path<(String, usize)>,
) -> ApiResult<Json<OrderResponse>> {
    let id = order_id(&id)?;
    outcome(st.desk.validate_proforma(&id, idx).await?)
}

pub(crate) async fn mark_paid(
    State(st): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<MarkPaidRequest>,
) -> ApiResult<Json<OrderResponse>> {
    let id = order_id(&id)?;
    outcome(st.desk.mark_paid(&id, &req.actor).await?)
}

// ---------------------------------------------------------------------------
// GET /v1/stream  (SSE)
// ---------------------------------------------------------------------------

pub(crate) async fn stream(State(st): State<Arc<AppState>>) -> Response {
    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    let rx = st.bus.subscribe();
    let events = broadcast_to_sse(rx);

    (headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response()
}

fn broadcast_to_sse(
    rx: broadcast::Receiver<OrderEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(rx).filter_map(|msg| async move {
        match msg {
            Ok(ev) => {
                let data = serde_json::to_string(&ev).ok()?;
                Some(Ok(Event::default().event(ev.kind.as_str()).data(data)))
            }
            Err(_) => None, // lagged
        }
    })
}

//! HTTP API consumed by the streamer overlay and the viewer page.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use superchat_common::amount::Amount;
use superchat_common::error::LedgerError;
use superchat_common::message::{Message, MessageId};
use superchat_common::reconcile::ReconcileReport;
use superchat_common::streamer::{normalize_address, StreamerProfile, MAX_QR_IMAGE_BYTES};
use superchat_common::transfer::{ObservedTransfer, TransferSource, TransferSourceError};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::ledger::Ledger;

/// Body limit on `/api/streamer-info`: a maximal QR data URL plus room for
/// the rest of the JSON envelope.
pub const STREAMER_INFO_BODY_LIMIT: usize = MAX_QR_IMAGE_BYTES + 64 * 1024;

pub struct AppState {
    pub ledger: Arc<Ledger>,
    pub source: Arc<dyn TransferSource>,
}

// ─── API types ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub name: String,
    pub message: String,
    pub amount: f64,
    #[serde(alias = "streamerAddress")]
    pub streamer_address: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SubmitResponse {
    pub id: MessageId,
    pub exact_amount: Amount,
    /// Four-decimal string to show the viewer.
    pub amount_formatted: String,
    /// Exact value to send, in MIST.
    pub raw_amount: String,
}

#[derive(Deserialize, Default, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    Confirmed,
    Pending,
}

#[derive(Deserialize)]
pub struct MessagesQuery {
    pub address: String,
    #[serde(default)]
    pub status: StatusFilter,
}

#[derive(Deserialize)]
pub struct AddressRequest {
    pub address: String,
}

#[derive(Deserialize)]
pub struct StreamerInfoRequest {
    pub address: String,
    #[serde(default, alias = "qrCodeImage")]
    pub qr_code_image: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub source: String,
    pub pending: usize,
    pub confirmed: usize,
    pub streamers: usize,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct TransfersResponse {
    pub transfers: Vec<ObservedTransfer>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

fn ledger_error(err: LedgerError) -> ApiError {
    let status = match &err {
        LedgerError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        LedgerError::NotFound(_) => StatusCode::NOT_FOUND,
        LedgerError::GenerationExhausted { .. } | LedgerError::TransientUpstreamFailure(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        LedgerError::DuplicateAmount { .. } | LedgerError::AlreadyConfirmed { .. } => {
            warn!("Ledger consistency error: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    api_error(status, err)
}

/// Extractor rejections become `{"error": ...}` bodies. Unparseable or
/// incomplete input is a 400 like any other invalid input.
fn rejection_status(status: StatusCode) -> StatusCode {
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        StatusCode::BAD_REQUEST
    } else {
        status
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|e| api_error(rejection_status(e.status()), e.body_text()))
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|e| api_error(rejection_status(e.status()), e.body_text()))
}

// ─── Messages ────────────────────────────────────────────────────────────────

async fn submit_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let req = json_body(payload)?;
    let submitted = state
        .ledger
        .submit_message(&req.name, &req.message, req.amount, &req.streamer_address)
        .await
        .map_err(ledger_error)?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            id: submitted.id,
            exact_amount: submitted.exact_amount,
            amount_formatted: submitted.exact_amount.key(),
            raw_amount: submitted.raw_amount().to_string(),
        }),
    ))
}

async fn list_messages_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<MessagesQuery>, QueryRejection>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let query = query_params(query)?;
    let messages = match query.status {
        StatusFilter::Confirmed => state.ledger.confirmed_messages(&query.address).await,
        StatusFilter::Pending => state.ledger.pending_messages(&query.address).await,
    }
    .map_err(ledger_error)?;
    Ok(Json(messages))
}

async fn get_message_handler(
    State(state): State<Arc<AppState>>,
    id: Result<Path<MessageId>, PathRejection>,
) -> Result<Json<Message>, ApiError> {
    let Path(id) = id.map_err(|e| api_error(rejection_status(e.status()), e.body_text()))?;
    state
        .ledger
        .message(&id)
        .await
        .map(Json)
        .ok_or_else(|| ledger_error(LedgerError::NotFound(id)))
}

// ─── Reconciliation ──────────────────────────────────────────────────────────

async fn reconcile_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AddressRequest>, JsonRejection>,
) -> Result<Json<ReconcileReport>, ApiError> {
    let req = json_body(payload)?;
    state
        .ledger
        .trigger_reconciliation(state.source.as_ref(), &req.address)
        .await
        .map(Json)
        .map_err(ledger_error)
}

/// Raw transfers as the source reports them, for debugging a missed match.
async fn transfers_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AddressRequest>, JsonRejection>,
) -> Result<Json<TransfersResponse>, ApiError> {
    let req = json_body(payload)?;
    let address = normalize_address(&req.address).map_err(ledger_error)?;
    let transfers = state
        .ledger
        .fetch_transfers(state.source.as_ref(), &address)
        .await
        .map_err(|e| match &e {
            TransferSourceError::Timeout(_) => api_error(StatusCode::GATEWAY_TIMEOUT, e),
            _ => api_error(StatusCode::BAD_GATEWAY, e),
        })?;
    Ok(Json(TransfersResponse { transfers }))
}

// ─── Streamer info ───────────────────────────────────────────────────────────

async fn save_streamer_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<StreamerInfoRequest>, JsonRejection>,
) -> Result<Json<StreamerProfile>, ApiError> {
    let req = json_body(payload)?;
    let profile =
        StreamerProfile::new(&req.address, req.qr_code_image, Utc::now()).map_err(ledger_error)?;
    Ok(Json(state.ledger.register_streamer(profile).await))
}

async fn get_streamer_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<AddressRequest>, QueryRejection>,
) -> Result<Json<StreamerProfile>, ApiError> {
    let req = query_params(query)?;
    match state.ledger.streamer(&req.address).await.map_err(ledger_error)? {
        Some(profile) => Ok(Json(profile)),
        None => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("no streamer registered for {}", req.address),
        )),
    }
}

// ─── Health ──────────────────────────────────────────────────────────────────

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let stats = state.ledger.stats().await;
    Json(HealthResponse {
        status: "ok".to_string(),
        source: state.source.source_name().to_string(),
        pending: stats.pending,
        confirmed: stats.confirmed,
        streamers: stats.streamers,
    })
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/api/messages", post(submit_handler).get(list_messages_handler))
        .route("/api/messages/{id}", get(get_message_handler))
        .route("/api/reconcile", post(reconcile_handler))
        .route("/api/sui-transactions", post(transfers_handler))
        .route(
            "/api/streamer-info",
            post(save_streamer_handler)
                .get(get_streamer_handler)
                .layer(DefaultBodyLimit::max(STREAMER_INFO_BODY_LIMIT)),
        )
        .route("/health", get(health_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

//! Invoice endpoints.

use super::pagination;
use crate::dtos::{
    CreateInvoiceRequest, InvoiceListParams, InvoiceResponse, InvoiceStatsResponse,
    PaymentResponse, RecordPaymentRequest, RecordPaymentResponse, StatsParams,
};
use crate::middleware::ValidatedJson;
use crate::models::{Actor, Page};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

pub async fn create_invoice(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(payload): ValidatedJson<CreateInvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    let invoice = state.invoices.create(&actor, payload.into()).await?;
    Ok((
        StatusCode::CREATED,
        Json(InvoiceResponse::new(&invoice, state.invoices.now())),
    ))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<InvoiceListParams>,
) -> Result<Json<Page<InvoiceResponse>>, AppError> {
    let filter = params.filter()?;
    let page = state
        .invoices
        .list(&actor, filter, pagination(params.page, params.per_page))
        .await?;
    let now = state.invoices.now();
    Ok(Json(page.map(|invoice| InvoiceResponse::new(&invoice, now))))
}

pub async fn invoice_stats(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<StatsParams>,
) -> Result<Json<InvoiceStatsResponse>, AppError> {
    let stats = state.invoices.stats(&actor, params.store_id).await?;
    Ok(Json(stats.into()))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = state.invoices.get(&actor, id).await?;
    Ok(Json(InvoiceResponse::new(&invoice, state.invoices.now())))
}

pub async fn record_payment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<RecordPaymentResponse>), AppError> {
    let (invoice, payment) = state
        .invoices
        .record_payment(&actor, id, payload.into())
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(RecordPaymentResponse {
            payment: PaymentResponse::from(&payment),
            invoice: InvoiceResponse::new(&invoice, state.invoices.now()),
        }),
    ))
}

pub async fn cancel_invoice(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = state.invoices.cancel(&actor, id).await?;
    Ok(Json(InvoiceResponse::new(&invoice, state.invoices.now())))
}

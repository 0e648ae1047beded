//! Quotation endpoints. Every route resolves the caller from actor headers and
//! renders quotations as seen at the service clock's `now`.

use super::pagination;
use crate::dtos::{
    CreateQuotationRequest, LineItemRequest, QuotationListParams, QuotationResponse,
    QuotationStatsResponse, StatsParams, UpdateLineItemRequest, UpdateQuotationRequest,
};
use crate::middleware::ValidatedJson;
use crate::models::{Actor, Page, Quotation};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

fn render(state: &AppState, quotation: &Quotation) -> QuotationResponse {
    let quotations = &state.quotations;
    QuotationResponse::new(quotation, quotations.now(), quotations.expiring_soon_days())
}

pub async fn create_quotation(
    State(state): State<AppState>,
    actor: Actor,
    ValidatedJson(payload): ValidatedJson<CreateQuotationRequest>,
) -> Result<(StatusCode, Json<QuotationResponse>), AppError> {
    let quotation = state.quotations.create(&actor, payload.into()).await?;
    Ok((StatusCode::CREATED, Json(render(&state, &quotation))))
}

pub async fn list_quotations(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<QuotationListParams>,
) -> Result<Json<Page<QuotationResponse>>, AppError> {
    let filter = params.filter()?;
    let page = state
        .quotations
        .list(&actor, filter, pagination(params.page, params.per_page))
        .await?;
    Ok(Json(page.map(|q| render(&state, &q))))
}

pub async fn quotation_stats(
    State(state): State<AppState>,
    actor: Actor,
    Query(params): Query<StatsParams>,
) -> Result<Json<QuotationStatsResponse>, AppError> {
    let stats = state.quotations.stats(&actor, params.store_id).await?;
    Ok(Json(stats.into()))
}

pub async fn get_quotation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<QuotationResponse>, AppError> {
    let quotation = state.quotations.get(&actor, id).await?;
    Ok(Json(render(&state, &quotation)))
}

pub async fn update_quotation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateQuotationRequest>,
) -> Result<Json<QuotationResponse>, AppError> {
    let quotation = state
        .quotations
        .update_terms(&actor, id, payload.into())
        .await?;
    Ok(Json(render(&state, &quotation)))
}

pub async fn add_line_item(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<LineItemRequest>,
) -> Result<(StatusCode, Json<QuotationResponse>), AppError> {
    let (quotation, item_id) = state
        .quotations
        .add_line_item(&actor, id, payload.into())
        .await?;
    tracing::debug!(quotation_id = %id, line_item_id = %item_id, "Line item added");
    Ok((StatusCode::CREATED, Json(render(&state, &quotation))))
}

pub async fn update_line_item(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
    ValidatedJson(payload): ValidatedJson<UpdateLineItemRequest>,
) -> Result<Json<QuotationResponse>, AppError> {
    let quotation = state
        .quotations
        .update_line_item(&actor, id, item_id, payload.into())
        .await?;
    Ok(Json(render(&state, &quotation)))
}

pub async fn remove_line_item(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<QuotationResponse>, AppError> {
    let quotation = state
        .quotations
        .remove_line_item(&actor, id, item_id)
        .await?;
    Ok(Json(render(&state, &quotation)))
}

pub async fn send_quotation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<QuotationResponse>, AppError> {
    let quotation = state.quotations.send(&actor, id).await?;
    Ok(Json(render(&state, &quotation)))
}

pub async fn approve_quotation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<QuotationResponse>, AppError> {
    let quotation = state.quotations.approve(&actor, id).await?;
    Ok(Json(render(&state, &quotation)))
}

pub async fn reject_quotation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<QuotationResponse>, AppError> {
    let quotation = state.quotations.reject(&actor, id).await?;
    Ok(Json(render(&state, &quotation)))
}

pub async fn revise_quotation(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<Uuid>,
) -> Result<Json<QuotationResponse>, AppError> {
    let quotation = state.quotations.revise(&actor, id).await?;
    Ok(Json(render(&state, &quotation)))
}

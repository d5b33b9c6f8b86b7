//! Cost calculation endpoints. Command bodies arrive query-string-encoded.

use crate::dtos::{default_page_size, CalculateCommand, CalculationListQuery, Page};
use crate::models::{CalculateCost, CostCalculation};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

/// Run a cost calculation, producing a DRAFT snapshot.
pub async fn calculate(
    State(state): State<AppState>,
    Query(cmd): Query<CalculateCommand>,
) -> Result<(StatusCode, Json<CostCalculation>), AppError> {
    tracing::info!(
        customer_id = %cmd.customer_id,
        resource_type = %cmd.resource_type,
        "Running cost calculation"
    );

    let calculation = state.calculations.calculate(&CalculateCost {
        customer_id: cmd.customer_id,
        resource_type: cmd.resource_type,
        billing_period: cmd.billing_period,
        period_start: cmd.period_start,
        period_end: cmd.period_end,
    })?;

    Ok((StatusCode::CREATED, Json(calculation)))
}

/// Recompute a DRAFT calculation.
pub async fn recalculate(
    State(state): State<AppState>,
    Path(calculation_id): Path<Uuid>,
) -> Result<Json<CostCalculation>, AppError> {
    let calculation = state.calculations.recalculate(calculation_id)?;
    Ok(Json(calculation))
}

/// Freeze a DRAFT calculation as FINAL.
pub async fn finalize(
    State(state): State<AppState>,
    Path(calculation_id): Path<Uuid>,
) -> Result<Json<CostCalculation>, AppError> {
    let calculation = state.calculations.finalize(calculation_id)?;
    Ok(Json(calculation))
}

/// Paginated cost calculation projection.
pub async fn list_calculations(
    State(state): State<AppState>,
    Query(query): Query<CalculationListQuery>,
) -> Json<Page<CostCalculation>> {
    let page = query.page.unwrap_or(0);
    let size = query.size.unwrap_or_else(default_page_size);
    let (content, total) = state.store.list_calculations(query.customer_id, page, size);
    Json(Page::new(content, page, size, total))
}

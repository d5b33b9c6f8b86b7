//! Billing cycle endpoints.

use crate::dtos::{default_page_size, CreateCycleRequest, CycleListQuery, Page};
use crate::models::{BillingCycle, CreateCycle, ListCyclesFilter};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

/// Create a PENDING billing cycle.
pub async fn create_cycle(
    State(state): State<AppState>,
    Json(payload): Json<CreateCycleRequest>,
) -> Result<(StatusCode, Json<BillingCycle>), AppError> {
    tracing::info!(
        customer_id = %payload.customer_id,
        start_date = %payload.start_date,
        end_date = %payload.end_date,
        "Creating billing cycle"
    );

    let cycle = state.cycles.create(&CreateCycle {
        customer_id: payload.customer_id,
        start_date: payload.start_date,
        end_date: payload.end_date,
        due_date: payload.due_date,
    })?;

    Ok((StatusCode::CREATED, Json(cycle)))
}

/// Paginated billing cycle projection.
pub async fn list_cycles(
    State(state): State<AppState>,
    Query(query): Query<CycleListQuery>,
) -> Json<Page<BillingCycle>> {
    let page = query.page.unwrap_or(0);
    let size = query.size.unwrap_or_else(default_page_size);

    let filter = ListCyclesFilter {
        customer_id: query.customer_id,
        status: query.status,
        page,
        size,
        sort: query.sort,
    };
    let (content, total) = state.store.list_cycles(&filter);

    Json(Page::new(content, page, size, total))
}

/// Get a billing cycle by id.
pub async fn get_cycle(
    State(state): State<AppState>,
    Path(cycle_id): Path<Uuid>,
) -> Result<Json<BillingCycle>, AppError> {
    let cycle = state
        .store
        .get_cycle(cycle_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Billing cycle not found")))?;
    Ok(Json(cycle))
}

/// Run the processing workflow for a cycle and return its updated state.
pub async fn process_cycle(
    State(state): State<AppState>,
    Path(cycle_id): Path<Uuid>,
) -> Result<Json<BillingCycle>, AppError> {
    tracing::info!(cycle_id = %cycle_id, "Processing billing cycle");
    let cycle = state.cycles.process(cycle_id).await?;
    Ok(Json(cycle))
}

//! Cost model CRUD endpoints. Command bodies arrive query-string-encoded.

use crate::dtos::{CostModelCommand, UpdateCostModelCommand};
use crate::models::{CostModel, CreateCostModel, UpdateCostModel};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use service_core::error::AppError;
use uuid::Uuid;

/// Create a cost model.
pub async fn create_cost_model(
    State(state): State<AppState>,
    Query(cmd): Query<CostModelCommand>,
) -> Result<(StatusCode, Json<CostModel>), AppError> {
    tracing::info!(
        model_name = %cmd.model_name,
        resource_type = %cmd.resource_type,
        "Creating cost model"
    );

    let model = state.store.create_cost_model(&CreateCostModel {
        model_name: cmd.model_name,
        resource_type: cmd.resource_type,
        billing_period: cmd.billing_period,
        base_cost: cmd.base_cost,
        overage_rate: cmd.overage_rate,
        included_usage: cmd.included_usage,
        currency: cmd.currency,
        active: cmd.active.unwrap_or(true),
    })?;

    Ok((StatusCode::CREATED, Json(model)))
}

/// List cost models.
pub async fn list_cost_models(State(state): State<AppState>) -> Json<Vec<CostModel>> {
    Json(state.store.list_cost_models(false))
}

/// Get a cost model by id.
pub async fn get_cost_model(
    State(state): State<AppState>,
    Path(model_id): Path<Uuid>,
) -> Result<Json<CostModel>, AppError> {
    let model = state
        .store
        .get_cost_model(model_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Cost model not found")))?;
    Ok(Json(model))
}

/// Update a cost model.
pub async fn update_cost_model(
    State(state): State<AppState>,
    Path(model_id): Path<Uuid>,
    Query(cmd): Query<UpdateCostModelCommand>,
) -> Result<Json<CostModel>, AppError> {
    let model = state.store.update_cost_model(
        model_id,
        &UpdateCostModel {
            base_cost: cmd.base_cost,
            overage_rate: cmd.overage_rate,
            included_usage: cmd.included_usage,
            active: cmd.active,
        },
    )?;
    Ok(Json(model))
}

/// Deactivate a cost model. Historical rating decisions keep referencing
/// it, so deletion is a deactivation.
pub async fn delete_cost_model(
    State(state): State<AppState>,
    Path(model_id): Path<Uuid>,
) -> Result<Json<CostModel>, AppError> {
    let model = state.store.deactivate_cost_model(model_id)?;
    Ok(Json(model))
}

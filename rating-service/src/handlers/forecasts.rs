//! Cost forecast endpoints. The generate command arrives
//! query-string-encoded; projections are plain reads.

use crate::dtos::ForecastCommand;
use crate::models::{CostForecast, GenerateForecast};
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use service_core::error::AppError;
use uuid::Uuid;

/// Generate forecasts over a future window.
pub async fn generate_forecast(
    State(state): State<AppState>,
    Query(cmd): Query<ForecastCommand>,
) -> Result<(StatusCode, Json<Vec<CostForecast>>), AppError> {
    tracing::info!(
        customer_id = %cmd.customer_id,
        resource_type = %cmd.resource_type,
        forecast_model = cmd.forecast_model.as_str(),
        "Generating cost forecast"
    );

    let forecasts = state.forecasts.generate(&GenerateForecast {
        customer_id: cmd.customer_id,
        resource_type: cmd.resource_type,
        billing_period: cmd.billing_period,
        forecast_start_date: cmd.forecast_start_date,
        forecast_end_date: cmd.forecast_end_date,
        historical_months: cmd.historical_months,
        forecast_model: cmd.forecast_model,
    })?;

    Ok((StatusCode::CREATED, Json(forecasts)))
}

/// Forecasts for a customer.
pub async fn forecasts_by_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Json<Vec<CostForecast>> {
    Json(state.store.list_forecasts(customer_id, None))
}

/// Forecasts for a customer narrowed to a resource type.
pub async fn forecasts_by_customer_resource(
    State(state): State<AppState>,
    Path((customer_id, resource_type)): Path<(Uuid, String)>,
) -> Json<Vec<CostForecast>> {
    Json(state.store.list_forecasts(customer_id, Some(&resource_type)))
}

/// Forecasts whose period starts at the given instant.
pub async fn forecasts_by_period(
    State(state): State<AppState>,
    Path(period_start): Path<DateTime<Utc>>,
) -> Json<Vec<CostForecast>> {
    Json(state.store.list_forecasts_by_period(period_start))
}

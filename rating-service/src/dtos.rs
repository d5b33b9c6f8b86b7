//! Wire DTOs for the REST surface.
//!
//! List responses share the pagination envelope the frontend stores
//! expect; command endpoints under `/api/monitoring` take their bodies
//! query-string-encoded.

use crate::models::{BillingPeriod, CycleStatus, ForecastModel, UsageType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

/// Pagination envelope for list endpoints.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total_elements: usize,
    pub total_pages: usize,
    pub first: bool,
    pub last: bool,
    pub number_of_elements: usize,
    pub empty: bool,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, page: usize, size: usize, total_elements: usize) -> Self {
        let size = size.clamp(1, 100);
        let total_pages = total_elements.div_ceil(size);
        let number_of_elements = content.len();
        Self {
            content,
            page,
            size,
            total_elements,
            total_pages,
            first: page == 0,
            last: total_pages == 0 || page + 1 >= total_pages,
            number_of_elements,
            empty: number_of_elements == 0,
        }
    }
}

pub fn default_page_size() -> usize {
    20
}

/// Request body for ingesting a usage record.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct IngestUsageRequest {
    pub customer_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub usage_type: UsageType,
    pub usage_amount: Decimal,
    #[validate(length(min = 1, max = 32))]
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    #[validate(length(min = 1, max = 128))]
    pub source: String,
    pub destination: Option<String>,
    #[validate(length(equal = 3))]
    pub currency: String,
    pub metadata: Option<serde_json::Value>,
}

/// Query parameters for listing usage records.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UsageListQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
    pub sort: Option<String>,
    pub unrated: Option<bool>,
    pub customer_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub usage_type: Option<UsageType>,
}

/// Request body for creating a billing cycle.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCycleRequest {
    pub customer_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Query parameters for listing billing cycles.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CycleListQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
    pub sort: Option<String>,
    pub status: Option<CycleStatus>,
    pub customer_id: Option<Uuid>,
}

/// Query-encoded command for creating a cost model.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostModelCommand {
    pub model_name: String,
    pub resource_type: String,
    pub billing_period: BillingPeriod,
    pub base_cost: Decimal,
    pub overage_rate: Decimal,
    pub included_usage: Decimal,
    pub currency: String,
    pub active: Option<bool>,
}

/// Query-encoded command for updating a cost model.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCostModelCommand {
    pub base_cost: Option<Decimal>,
    pub overage_rate: Option<Decimal>,
    pub included_usage: Option<Decimal>,
    pub active: Option<bool>,
}

/// Query-encoded command for running a cost calculation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculateCommand {
    pub customer_id: Uuid,
    pub resource_type: String,
    pub billing_period: BillingPeriod,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

/// Query parameters for listing cost calculations.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CalculationListQuery {
    pub page: Option<usize>,
    pub size: Option<usize>,
    pub customer_id: Option<Uuid>,
}

/// Query-encoded command for generating cost forecasts.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastCommand {
    pub customer_id: Uuid,
    pub resource_type: String,
    pub billing_period: BillingPeriod,
    pub forecast_start_date: DateTime<Utc>,
    pub forecast_end_date: DateTime<Utc>,
    pub historical_months: i64,
    pub forecast_model: ForecastModel,
}

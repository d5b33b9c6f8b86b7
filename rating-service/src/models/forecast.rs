//! Cost forecast model.

use super::BillingPeriod;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Forecasting model selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForecastModel {
    LinearRegression,
    MovingAverage,
}

impl ForecastModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ForecastModel::LinearRegression => "LINEAR_REGRESSION",
            ForecastModel::MovingAverage => "MOVING_AVERAGE",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "MOVING_AVERAGE" => ForecastModel::MovingAverage,
            _ => ForecastModel::LinearRegression,
        }
    }
}

/// Direction of the fitted cost trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrendDirection::Increasing => "INCREASING",
            TrendDirection::Decreasing => "DECREASING",
            TrendDirection::Stable => "STABLE",
        }
    }
}

/// Derived cost projection. Always recomputable from history; never feeds
/// back into billing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostForecast {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub resource_type: String,
    pub billing_period: BillingPeriod,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub predicted_cost: Decimal,
    pub lower_bound: Decimal,
    pub upper_bound: Decimal,
    pub trend_direction: TrendDirection,
    pub confidence_level: f64,
    pub forecast_model: ForecastModel,
    pub created_utc: DateTime<Utc>,
}

/// Command to generate forecasts over a future window.
#[derive(Debug, Clone)]
pub struct GenerateForecast {
    pub customer_id: Uuid,
    pub resource_type: String,
    pub billing_period: BillingPeriod,
    pub forecast_start_date: DateTime<Utc>,
    pub forecast_end_date: DateTime<Utc>,
    pub historical_months: i64,
    pub forecast_model: ForecastModel,
}

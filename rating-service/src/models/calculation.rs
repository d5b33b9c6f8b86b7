//! Cost calculation snapshot.

use super::BillingPeriod;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Calculation lifecycle. DRAFT is recalculable; FINAL and INVOICED are
/// frozen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CalculationStatus {
    Draft,
    Final,
    Invoiced,
}

impl CalculationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CalculationStatus::Draft => "DRAFT",
            CalculationStatus::Final => "FINAL",
            CalculationStatus::Invoiced => "INVOICED",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "FINAL" => CalculationStatus::Final,
            "INVOICED" => CalculationStatus::Invoiced,
            _ => CalculationStatus::Draft,
        }
    }
}

/// Immutable snapshot of a cost computation for a customer, resource type
/// and period.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostCalculation {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub resource_type: String,
    pub billing_period: BillingPeriod,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub total_usage: Decimal,
    pub base_cost: Decimal,
    pub overage_cost: Decimal,
    pub total_cost: Decimal,
    pub currency: String,
    pub status: CalculationStatus,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Command to compute a cost calculation.
#[derive(Debug, Clone)]
pub struct CalculateCost {
    pub customer_id: Uuid,
    pub resource_type: String,
    pub billing_period: BillingPeriod,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
}

//! Cost model.

use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Billing period granularity of a cost model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillingPeriod {
    Hourly,
    Daily,
    Monthly,
    Yearly,
}

impl BillingPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingPeriod::Hourly => "hourly",
            BillingPeriod::Daily => "daily",
            BillingPeriod::Monthly => "monthly",
            BillingPeriod::Yearly => "yearly",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "hourly" => BillingPeriod::Hourly,
            "daily" => BillingPeriod::Daily,
            "yearly" => BillingPeriod::Yearly,
            _ => BillingPeriod::Monthly,
        }
    }

    /// Key identifying the period a timestamp falls into. Included-usage
    /// apportionment resets at each key boundary.
    pub fn period_key(&self, ts: DateTime<Utc>) -> String {
        match self {
            BillingPeriod::Hourly => ts.format("%Y-%m-%dT%H").to_string(),
            BillingPeriod::Daily => ts.format("%Y-%m-%d").to_string(),
            BillingPeriod::Monthly => ts.format("%Y-%m").to_string(),
            BillingPeriod::Yearly => format!("{}", ts.year()),
        }
    }

    /// Step width in days used when walking forecast windows.
    pub fn period_days(&self) -> i64 {
        match self {
            BillingPeriod::Hourly | BillingPeriod::Daily => 1,
            BillingPeriod::Monthly => 30,
            BillingPeriod::Yearly => 365,
        }
    }
}

/// Cost model resolved at rating time by resource type and billing period.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostModel {
    pub id: Uuid,
    pub model_name: String,
    pub resource_type: String,
    pub billing_period: BillingPeriod,
    pub base_cost: Decimal,
    pub overage_rate: Decimal,
    pub included_usage: Decimal,
    pub currency: String,
    pub active: bool,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a cost model.
#[derive(Debug, Clone)]
pub struct CreateCostModel {
    pub model_name: String,
    pub resource_type: String,
    pub billing_period: BillingPeriod,
    pub base_cost: Decimal,
    pub overage_rate: Decimal,
    pub included_usage: Decimal,
    pub currency: String,
    pub active: bool,
}

/// Partial update for a cost model.
#[derive(Debug, Clone, Default)]
pub struct UpdateCostModel {
    pub base_cost: Option<Decimal>,
    pub overage_rate: Option<Decimal>,
    pub included_usage: Option<Decimal>,
    pub active: Option<bool>,
}

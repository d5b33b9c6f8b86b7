//! Usage record model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of usage captured by a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UsageType {
    Voice,
    Sms,
    Data,
    Service,
}

impl UsageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::Voice => "VOICE",
            UsageType::Sms => "SMS",
            UsageType::Data => "DATA",
            UsageType::Service => "SERVICE",
        }
    }

    pub fn from_string(s: &str) -> Option<Self> {
        match s {
            "VOICE" => Some(UsageType::Voice),
            "SMS" => Some(UsageType::Sms),
            "DATA" => Some(UsageType::Data),
            "SERVICE" => Some(UsageType::Service),
            _ => None,
        }
    }

    /// Resource type key used to resolve a cost model for this usage.
    pub fn resource_type(&self) -> &'static str {
        self.as_str()
    }
}

/// Rating lifecycle of a usage record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RatingStatus {
    Pending,
    Processed,
    Rated,
    Billable,
    Included,
}

impl RatingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RatingStatus::Pending => "PENDING",
            RatingStatus::Processed => "PROCESSED",
            RatingStatus::Rated => "RATED",
            RatingStatus::Billable => "BILLABLE",
            RatingStatus::Included => "INCLUDED",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "PROCESSED" => RatingStatus::Processed,
            "RATED" => RatingStatus::Rated,
            "BILLABLE" => RatingStatus::Billable,
            "INCLUDED" => RatingStatus::Included,
            _ => RatingStatus::Pending,
        }
    }

    /// Terminal rating states carry a populated cost.
    pub fn is_rated(&self) -> bool {
        matches!(
            self,
            RatingStatus::Rated | RatingStatus::Billable | RatingStatus::Included
        )
    }
}

/// Usage record. Append-only: created at ingest, mutated exactly once by
/// the rating engine, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub usage_type: UsageType,
    pub usage_amount: Decimal,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub destination: Option<String>,
    pub is_rated: bool,
    pub rating_status: RatingStatus,
    pub rated_amount: Option<Decimal>,
    pub currency: String,
    pub cost: Option<Decimal>,
    pub metadata: Option<serde_json::Value>,
    pub created_utc: DateTime<Utc>,
}

/// Input for ingesting a usage record.
#[derive(Debug, Clone)]
pub struct IngestUsage {
    pub customer_id: Uuid,
    pub subscription_id: Option<Uuid>,
    pub usage_type: UsageType,
    pub usage_amount: Decimal,
    pub unit: String,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub destination: Option<String>,
    pub currency: String,
    pub metadata: Option<serde_json::Value>,
}

/// Filter parameters for listing usage records.
#[derive(Debug, Clone, Default)]
pub struct ListUsageFilter {
    pub customer_id: Option<Uuid>,
    pub subscription_id: Option<Uuid>,
    pub usage_type: Option<UsageType>,
    pub unrated: Option<bool>,
    pub page: usize,
    pub size: usize,
    pub sort: Option<String>,
}

//! Billing cycle model and state machine.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Billing cycle status.
///
/// Transitions are a closed table on the enum; anything not listed in
/// [`CycleStatus::can_transition_to`] is rejected before state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CycleStatus {
    Pending,
    Scheduled,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl CycleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CycleStatus::Pending => "PENDING",
            CycleStatus::Scheduled => "SCHEDULED",
            CycleStatus::Processing => "PROCESSING",
            CycleStatus::Completed => "COMPLETED",
            CycleStatus::Failed => "FAILED",
            CycleStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "SCHEDULED" => CycleStatus::Scheduled,
            "PROCESSING" => CycleStatus::Processing,
            "COMPLETED" => CycleStatus::Completed,
            "FAILED" => CycleStatus::Failed,
            "CANCELLED" => CycleStatus::Cancelled,
            _ => CycleStatus::Pending,
        }
    }

    /// Transition table. FAILED stays retryable; COMPLETED and CANCELLED
    /// are immutable.
    pub fn can_transition_to(self, next: CycleStatus) -> bool {
        use CycleStatus::*;
        matches!(
            (self, next),
            (Pending, Scheduled)
                | (Scheduled, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Failed, Processing)
                | (Pending, Cancelled)
                | (Scheduled, Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleStatus::Completed | CycleStatus::Cancelled)
    }
}

/// Billing cycle for one customer period.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingCycle {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub cycle_number: i32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
    pub status: CycleStatus,
    pub total_usage: Decimal,
    pub total_cost: Decimal,
    pub total_rated_cost: Decimal,
    pub currency: String,
    pub invoice_id: Option<Uuid>,
    /// Record ids that were still unrated when a grace period expired.
    pub unrated_record_ids: Vec<Uuid>,
    pub error_message: Option<String>,
    pub created_utc: DateTime<Utc>,
    pub updated_utc: DateTime<Utc>,
}

/// Input for creating a billing cycle.
#[derive(Debug, Clone)]
pub struct CreateCycle {
    pub customer_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub due_date: Option<DateTime<Utc>>,
}

/// Filter parameters for listing billing cycles.
#[derive(Debug, Clone, Default)]
pub struct ListCyclesFilter {
    pub customer_id: Option<Uuid>,
    pub status: Option<CycleStatus>,
    pub page: usize,
    pub size: usize,
    pub sort: Option<String>,
}

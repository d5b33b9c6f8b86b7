//! Rating engine: converts raw usage into rated charges.
//!
//! Rating is serialized per `(customer, model, period)` through a keyed
//! mutex table so included-usage apportionment never double-counts under
//! concurrent rating. Everything else parallelizes across customers.

use crate::models::{CostModel, RatingStatus, UsageRecord};
use crate::services::metrics::{record_rated, record_rating_failure};
use crate::services::Store;
use dashmap::DashMap;
use rust_decimal::{Decimal, RoundingStrategy};
use service_core::error::AppError;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Rating failures leave the record PENDING; the sweep retries them until
/// an operator remediates the cause.
#[derive(Debug, Error)]
pub enum RatingError {
    #[error("no active cost model for resource type {0}")]
    NoCostModel(String),

    #[error("record cannot be rated: {0}")]
    Unrateable(String),

    #[error("usage record not found")]
    NotFound,
}

impl From<RatingError> for AppError {
    fn from(err: RatingError) -> Self {
        match err {
            RatingError::NotFound => AppError::NotFound(anyhow::anyhow!("usage record not found")),
            other => AppError::Conflict(anyhow::anyhow!(other.to_string())),
        }
    }
}

/// Outcome of one background sweep pass.
#[derive(Debug, Default, Clone, Copy)]
pub struct SweepSummary {
    pub rated: usize,
    pub failed: usize,
}

/// Per-period apportionment state. `remaining_included` draws down as
/// records consume the model's included usage; the base cost is carried by
/// the first record rated in the period.
struct PeriodAccumulator {
    remaining_included: Decimal,
    base_applied: bool,
}

type PeriodKey = (Uuid, Uuid, String);

/// Minor-unit precision of an ISO 4217 currency.
pub fn minor_units(currency: &str) -> u32 {
    match currency {
        "JPY" | "KRW" | "VND" | "CLP" => 0,
        "BHD" | "KWD" | "OMR" | "TND" => 3,
        _ => 2,
    }
}

/// Round a money amount to the currency's minor units, half away from
/// zero.
pub fn round_money(amount: Decimal, currency: &str) -> Decimal {
    amount.round_dp_with_strategy(minor_units(currency), RoundingStrategy::MidpointAwayFromZero)
}

pub struct RatingEngine {
    store: Arc<Store>,
    period_locks: DashMap<PeriodKey, Arc<Mutex<PeriodAccumulator>>>,
}

impl RatingEngine {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            period_locks: DashMap::new(),
        }
    }

    /// Rate a single usage record. Idempotent: an already-rated record is
    /// returned unchanged without touching the accumulator.
    #[instrument(skip(self), fields(record_id = %record_id))]
    pub async fn rate_record(&self, record_id: Uuid) -> Result<UsageRecord, RatingError> {
        let record = self
            .store
            .get_usage_record(record_id)
            .ok_or(RatingError::NotFound)?;

        if record.is_rated {
            return Ok(record);
        }

        let model = self
            .store
            .resolve_active_model(record.usage_type.resource_type())
            .ok_or_else(|| {
                record_rating_failure("no_cost_model");
                RatingError::NoCostModel(record.usage_type.resource_type().to_string())
            })?;

        if model.currency != record.currency {
            record_rating_failure("currency_mismatch");
            return Err(RatingError::Unrateable(format!(
                "record currency {} does not match model currency {}",
                record.currency, model.currency
            )));
        }

        let key: PeriodKey = (
            record.customer_id,
            model.id,
            model.billing_period.period_key(record.timestamp),
        );
        let accumulator = self
            .period_locks
            .entry(key)
            .or_insert_with(|| {
                Arc::new(Mutex::new(PeriodAccumulator {
                    remaining_included: model.included_usage,
                    base_applied: false,
                }))
            })
            .value()
            .clone();

        let mut period = accumulator.lock().await;

        // Re-read under the lock: a concurrent rater may have won.
        let record = self
            .store
            .get_usage_record(record_id)
            .ok_or(RatingError::NotFound)?;
        if record.is_rated {
            return Ok(record);
        }

        let (status, rated_amount, cost) = apportion(&record, &model, &mut period);

        // Persist while still holding the period lock, so a concurrent
        // rater cannot consume the same included usage twice.
        let updated = self
            .store
            .apply_rating(record_id, status, rated_amount, cost)
            .map_err(|e| RatingError::Unrateable(e.to_string()))?;
        drop(period);

        record_rated(status.as_str());
        debug!(
            record_id = %record_id,
            rating_status = status.as_str(),
            cost = %cost,
            "Usage record rated"
        );
        Ok(updated)
    }

    /// One pass over all PENDING records. Failures stay PENDING and are
    /// retried on the next pass.
    #[instrument(skip(self))]
    pub async fn sweep(&self) -> SweepSummary {
        let pending = self.store.pending_usage_records();
        let mut summary = SweepSummary::default();

        for record in pending {
            match self.rate_record(record.id).await {
                Ok(_) => summary.rated += 1,
                Err(RatingError::NotFound) => {}
                Err(e) => {
                    summary.failed += 1;
                    warn!(record_id = %record.id, error = %e, "Rating sweep failure");
                }
            }
        }

        summary
    }
}

/// Compute the rated charge for one record against the period state.
///
/// `billable = max(0, amount - remaining_included)`; overage rates at the
/// model's rate; the base cost lands exactly once per period, on the first
/// record rated in it. Intermediate math keeps full precision; the
/// persisted amounts round to the currency's minor units.
fn apportion(
    record: &UsageRecord,
    model: &CostModel,
    period: &mut PeriodAccumulator,
) -> (RatingStatus, Decimal, Decimal) {
    let consumed = record.usage_amount.min(period.remaining_included);
    period.remaining_included -= consumed;
    let billable = record.usage_amount - consumed;

    let overage = billable * model.overage_rate;

    let base_share = if period.base_applied {
        Decimal::ZERO
    } else {
        period.base_applied = true;
        model.base_cost
    };

    let rated_amount = round_money(overage, &model.currency);
    let cost = round_money(overage + base_share, &model.currency);

    let status = if overage > Decimal::ZERO {
        RatingStatus::Billable
    } else if billable > Decimal::ZERO {
        // Billable units under a zero overage rate: terminal, but neither
        // covered nor chargeable.
        RatingStatus::Rated
    } else {
        RatingStatus::Included
    };

    (status, rated_amount, cost)
}

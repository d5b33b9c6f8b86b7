//! Cost calculation snapshots for customer, resource type and period.

use crate::models::{CalculateCost, CalculationStatus, CostCalculation, UsageRecord};
use crate::services::rating::round_money;
use crate::services::Store;
use chrono::Utc;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

pub struct CalculationService {
    store: Arc<Store>,
    default_currency: String,
}

struct Totals {
    total_usage: Decimal,
    base_cost: Decimal,
    overage_cost: Decimal,
    total_cost: Decimal,
    currency: String,
}

impl CalculationService {
    pub fn new(store: Arc<Store>, default_currency: String) -> Self {
        Self {
            store,
            default_currency,
        }
    }

    /// Compute a DRAFT snapshot from the rated ledger.
    #[instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id, resource_type = %cmd.resource_type))]
    pub fn calculate(&self, cmd: &CalculateCost) -> Result<CostCalculation, AppError> {
        if cmd.period_end <= cmd.period_start {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "periodEnd must be after periodStart"
            )));
        }

        let totals = self.compute(cmd);
        let now = Utc::now();
        let calculation = CostCalculation {
            id: Uuid::new_v4(),
            customer_id: cmd.customer_id,
            resource_type: cmd.resource_type.clone(),
            billing_period: cmd.billing_period,
            period_start: cmd.period_start,
            period_end: cmd.period_end,
            total_usage: totals.total_usage,
            base_cost: totals.base_cost,
            overage_cost: totals.overage_cost,
            total_cost: totals.total_cost,
            currency: totals.currency,
            status: CalculationStatus::Draft,
            created_utc: now,
            updated_utc: now,
        };
        info!(calculation_id = %calculation.id, total_cost = %calculation.total_cost, "Cost calculation created");
        Ok(self.store.insert_calculation(calculation))
    }

    /// Recompute a DRAFT in place. FINAL and INVOICED snapshots are frozen.
    #[instrument(skip(self), fields(calculation_id = %calculation_id))]
    pub fn recalculate(&self, calculation_id: Uuid) -> Result<CostCalculation, AppError> {
        let existing = self.store.get_calculation(calculation_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Cost calculation not found"))
        })?;

        if existing.status != CalculationStatus::Draft {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "only DRAFT calculations can be recalculated"
            )));
        }

        let cmd = CalculateCost {
            customer_id: existing.customer_id,
            resource_type: existing.resource_type.clone(),
            billing_period: existing.billing_period,
            period_start: existing.period_start,
            period_end: existing.period_end,
        };
        let totals = self.compute(&cmd);

        self.store.update_calculation(calculation_id, |calculation| {
            calculation.total_usage = totals.total_usage;
            calculation.base_cost = totals.base_cost;
            calculation.overage_cost = totals.overage_cost;
            calculation.total_cost = totals.total_cost;
            calculation.currency = totals.currency.clone();
        })
    }

    /// DRAFT -> FINAL. Final snapshots feed forecasting.
    #[instrument(skip(self), fields(calculation_id = %calculation_id))]
    pub fn finalize(&self, calculation_id: Uuid) -> Result<CostCalculation, AppError> {
        let existing = self.store.get_calculation(calculation_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Cost calculation not found"))
        })?;

        if existing.status != CalculationStatus::Draft {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "only DRAFT calculations can be finalized"
            )));
        }

        self.store.update_calculation(calculation_id, |calculation| {
            calculation.status = CalculationStatus::Final;
        })
    }

    fn compute(&self, cmd: &CalculateCost) -> Totals {
        let records: Vec<UsageRecord> = self
            .store
            .rated_in_window(cmd.customer_id, cmd.period_start, cmd.period_end)
            .into_iter()
            .filter(|r| r.usage_type.resource_type() == cmd.resource_type)
            .collect();

        let mut total_usage = Decimal::ZERO;
        let mut overage_cost = Decimal::ZERO;
        let mut total_cost = Decimal::ZERO;
        for record in &records {
            total_usage += record.usage_amount;
            overage_cost += record.rated_amount.unwrap_or(Decimal::ZERO);
            total_cost += record.cost.unwrap_or(Decimal::ZERO);
        }
        // The base component is whatever the rated costs carry beyond the
        // overage charges.
        let base_cost = total_cost - overage_cost;

        let currency = records
            .first()
            .map(|r| r.currency.clone())
            .or_else(|| {
                self.store
                    .resolve_active_model(&cmd.resource_type)
                    .map(|m| m.currency)
            })
            .unwrap_or_else(|| self.default_currency.clone());

        Totals {
            total_usage,
            base_cost: round_money(base_cost, &currency),
            overage_cost: round_money(overage_cost, &currency),
            total_cost: round_money(total_cost, &currency),
            currency,
        }
    }
}

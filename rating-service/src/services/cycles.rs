//! Billing cycle engine: lifecycle transitions, straggler handling and
//! aggregation over the cycle's usage window.

use crate::config::BillingCycleConfig;
use crate::models::{BillingCycle, CreateCycle, CycleStatus, UsageRecord};
use crate::services::metrics::record_cycle_processed;
use crate::services::rating::RatingError;
use crate::services::{InvoiceGenerator, RatingEngine, Store};
use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct CycleEngine {
    store: Arc<Store>,
    rating: Arc<RatingEngine>,
    invoicer: Arc<dyn InvoiceGenerator>,
    straggler_grace: Duration,
    straggler_retry: Duration,
    payment_terms_days: i64,
    default_currency: String,
}

impl CycleEngine {
    pub fn new(
        store: Arc<Store>,
        rating: Arc<RatingEngine>,
        invoicer: Arc<dyn InvoiceGenerator>,
        billing: &BillingCycleConfig,
        straggler_grace: Duration,
        straggler_retry: Duration,
    ) -> Self {
        Self {
            store,
            rating,
            invoicer,
            straggler_grace,
            straggler_retry,
            payment_terms_days: billing.payment_terms_days,
            default_currency: billing.default_currency.clone(),
        }
    }

    /// Create a PENDING cycle.
    pub fn create(&self, input: &CreateCycle) -> Result<BillingCycle, AppError> {
        self.store.create_cycle(input, &self.default_currency)
    }

    /// PENDING -> SCHEDULED. A missing due date defaults to the end date
    /// plus payment terms.
    #[instrument(skip(self), fields(cycle_id = %cycle_id))]
    pub fn schedule(&self, cycle_id: Uuid) -> Result<BillingCycle, AppError> {
        let payment_terms = ChronoDuration::days(self.payment_terms_days);
        self.store
            .transition_cycle(cycle_id, CycleStatus::Scheduled, |cycle| {
                if cycle.due_date.is_none() {
                    cycle.due_date = Some(cycle.end_date + payment_terms);
                }
            })
    }

    /// Administrative cancellation. Only PENDING and SCHEDULED cycles may
    /// cancel; the transition table rejects the rest.
    #[instrument(skip(self), fields(cycle_id = %cycle_id))]
    pub fn cancel(&self, cycle_id: Uuid) -> Result<BillingCycle, AppError> {
        self.store
            .transition_cycle(cycle_id, CycleStatus::Cancelled, |_| {})
    }

    /// Run the processing workflow for a cycle: acquire the per-customer
    /// slot, rate stragglers within the grace period, aggregate, invoice.
    ///
    /// Re-invoking on a COMPLETED cycle returns the existing result.
    #[instrument(skip(self), fields(cycle_id = %cycle_id))]
    pub async fn process(&self, cycle_id: Uuid) -> Result<BillingCycle, AppError> {
        let cycle = self
            .store
            .get_cycle(cycle_id)
            .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Billing cycle not found")))?;

        match cycle.status {
            CycleStatus::Completed => {
                record_cycle_processed("already_completed");
                return Ok(cycle);
            }
            CycleStatus::Cancelled => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "cancelled cycle cannot be processed"
                )));
            }
            CycleStatus::Processing => {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "cycle is already processing"
                )));
            }
            _ => {}
        }

        if cycle.status == CycleStatus::Pending {
            self.schedule(cycle_id)?;
        }

        self.store.begin_processing(cycle.customer_id, cycle_id)?;

        let started = self
            .store
            .transition_cycle(cycle_id, CycleStatus::Processing, |c| {
                c.unrated_record_ids.clear();
                c.error_message = None;
            });
        let started = match started {
            Ok(c) => c,
            Err(e) => {
                self.store.end_processing(cycle.customer_id, cycle_id);
                return Err(e);
            }
        };

        let outcome = self.run_window(&started).await;
        self.store.end_processing(cycle.customer_id, cycle_id);
        outcome
    }

    /// Straggler rating, aggregation and invoicing for a PROCESSING cycle.
    async fn run_window(&self, cycle: &BillingCycle) -> Result<BillingCycle, AppError> {
        let deadline = tokio::time::Instant::now() + self.straggler_grace;

        loop {
            let stragglers =
                self.store
                    .unrated_in_window(cycle.customer_id, cycle.start_date, cycle.end_date);
            if stragglers.is_empty() {
                break;
            }

            let mut unrated: Vec<Uuid> = Vec::new();
            for record in &stragglers {
                match self.rating.rate_record(record.id).await {
                    Ok(_) => {}
                    Err(RatingError::NotFound) => {}
                    Err(e) => {
                        warn!(record_id = %record.id, error = %e, "Straggler rating failed");
                        unrated.push(record.id);
                    }
                }
            }

            if unrated.is_empty() {
                continue;
            }

            if tokio::time::Instant::now() >= deadline {
                let failed =
                    self.store
                        .transition_cycle(cycle.id, CycleStatus::Failed, |c| {
                            c.unrated_record_ids = unrated.clone();
                            c.error_message = Some(format!(
                                "grace period expired with {} unrated usage records",
                                unrated.len()
                            ));
                        })?;
                record_cycle_processed("failed_stragglers");
                warn!(
                    cycle_id = %cycle.id,
                    unrated = failed.unrated_record_ids.len(),
                    "Cycle failed: unrated stragglers after grace period"
                );
                return Ok(failed);
            }

            tokio::time::sleep(self.straggler_retry).await;
        }

        let rated =
            self.store
                .rated_in_window(cycle.customer_id, cycle.start_date, cycle.end_date);
        let (total_usage, total_rated_cost, total_cost) = aggregate(&rated);
        let currency = rated
            .first()
            .map(|r| r.currency.clone())
            .unwrap_or_else(|| self.default_currency.clone());

        let aggregated = {
            let currency = currency.clone();
            let mut staged = cycle.clone();
            staged.total_usage = total_usage;
            staged.total_rated_cost = total_rated_cost;
            staged.total_cost = total_cost;
            staged.currency = currency;
            staged
        };

        match self.invoicer.generate_invoice(&aggregated).await {
            Ok(invoice_id) => {
                let completed =
                    self.store
                        .transition_cycle(cycle.id, CycleStatus::Completed, |c| {
                            c.total_usage = total_usage;
                            c.total_rated_cost = total_rated_cost;
                            c.total_cost = total_cost;
                            c.currency = currency.clone();
                            c.invoice_id = Some(invoice_id);
                        })?;
                record_cycle_processed("completed");
                info!(
                    cycle_id = %cycle.id,
                    invoice_id = %invoice_id,
                    total_cost = %completed.total_cost,
                    records = rated.len(),
                    "Cycle completed"
                );
                Ok(completed)
            }
            Err(e) => {
                let failed =
                    self.store
                        .transition_cycle(cycle.id, CycleStatus::Failed, |c| {
                            c.total_usage = total_usage;
                            c.total_rated_cost = total_rated_cost;
                            c.total_cost = total_cost;
                            c.currency = currency.clone();
                            c.error_message = Some(format!("invoice generation failed: {}", e));
                        })?;
                record_cycle_processed("failed_invoice");
                warn!(cycle_id = %cycle.id, error = %e, "Cycle failed: invoice generation");
                Ok(failed)
            }
        }
    }
}

/// Sum the rated window. Record costs are already rounded to minor units,
/// so the totals stay exact.
fn aggregate(records: &[UsageRecord]) -> (Decimal, Decimal, Decimal) {
    let mut total_usage = Decimal::ZERO;
    let mut total_rated_cost = Decimal::ZERO;
    let mut total_cost = Decimal::ZERO;
    for record in records {
        total_usage += record.usage_amount;
        total_rated_cost += record.rated_amount.unwrap_or(Decimal::ZERO);
        total_cost += record.cost.unwrap_or(Decimal::ZERO);
    }
    (total_usage, total_rated_cost, total_cost)
}

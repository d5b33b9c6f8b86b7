//! Materialized state for rating-service.
//!
//! The engine owns no external datastore: ingest, rating, cycle and
//! forecast state live in sharded in-memory indexes. Every mutation goes
//! through this service so the invariants (dedup atomicity, rate-once,
//! cycle transition table, per-customer processing exclusivity) are
//! enforced in one place.

use crate::models::{
    BillingCycle, CalculationStatus, CostCalculation, CostForecast, CostModel, CreateCostModel,
    CreateCycle, CycleStatus, IngestUsage, ListCyclesFilter, ListUsageFilter, RatingStatus,
    UpdateCostModel, UsageRecord, UsageType,
};
use crate::services::metrics::STORE_OP_DURATION;
use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use service_core::error::AppError;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Dedup key for at-least-once ingest: a replayed delivery carries the
/// same tuple and must resolve to the already-stored record.
type DedupKey = (String, Uuid, DateTime<Utc>, UsageType);

/// In-memory materialized state.
pub struct Store {
    records: DashMap<Uuid, UsageRecord>,
    dedup: DashMap<DedupKey, Uuid>,
    cycles: DashMap<Uuid, BillingCycle>,
    cycle_numbers: DashMap<Uuid, i32>,
    processing: DashMap<Uuid, Uuid>,
    cost_models: DashMap<Uuid, CostModel>,
    model_names: DashMap<String, Uuid>,
    calculations: DashMap<Uuid, CostCalculation>,
    forecasts: DashMap<Uuid, CostForecast>,
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

fn clamp_page(size: usize) -> usize {
    size.clamp(1, 100)
}

fn paginate<T>(items: Vec<T>, page: usize, size: usize) -> (Vec<T>, usize) {
    let total = items.len();
    let size = clamp_page(size);
    let content = items.into_iter().skip(page * size).take(size).collect();
    (content, total)
}

fn parse_sort(sort: &Option<String>) -> (Option<String>, bool) {
    match sort {
        Some(raw) => {
            let mut parts = raw.splitn(2, ',');
            let field = parts.next().unwrap_or("").trim().to_string();
            let descending = parts
                .next()
                .map(|d| d.trim().eq_ignore_ascii_case("desc"))
                .unwrap_or(false);
            if field.is_empty() {
                (None, false)
            } else {
                (Some(field), descending)
            }
        }
        None => (None, false),
    }
}

impl Store {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            dedup: DashMap::new(),
            cycles: DashMap::new(),
            cycle_numbers: DashMap::new(),
            processing: DashMap::new(),
            cost_models: DashMap::new(),
            model_names: DashMap::new(),
            calculations: DashMap::new(),
            forecasts: DashMap::new(),
        }
    }

    // =========================================================================
    // Usage Record Operations
    // =========================================================================

    /// Ingest a usage record with idempotent dedup.
    ///
    /// Returns the stored record and whether this delivery was a replay of
    /// an earlier one. The dedup index performs an atomic check-and-insert
    /// so two concurrent identical deliveries yield exactly one record.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id, source = %input.source))]
    pub fn ingest_usage(
        &self,
        input: IngestUsage,
        max_future_skew: Duration,
    ) -> Result<(UsageRecord, bool), AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["ingest_usage"])
            .start_timer();

        if input.usage_amount <= Decimal::ZERO {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "usageAmount must be positive"
            )));
        }
        if input.currency.len() != 3 || !input.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "currency must be a 3-letter ISO 4217 code"
            )));
        }
        let now = Utc::now();
        if input.timestamp > now + max_future_skew {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "timestamp is beyond the tolerated clock skew"
            )));
        }

        let key: DedupKey = (
            input.source.clone(),
            input.customer_id,
            input.timestamp,
            input.usage_type,
        );

        let result = match self.dedup.entry(key) {
            Entry::Occupied(existing) => {
                let id = *existing.get();
                let record = self
                    .records
                    .get(&id)
                    .map(|r| r.clone())
                    .ok_or_else(|| {
                        AppError::InternalError(anyhow::anyhow!("dedup index points at missing record"))
                    })?;
                info!(record_id = %id, "Replayed delivery resolved to stored record");
                (record, true)
            }
            Entry::Vacant(slot) => {
                let record = UsageRecord {
                    id: Uuid::new_v4(),
                    customer_id: input.customer_id,
                    subscription_id: input.subscription_id,
                    usage_type: input.usage_type,
                    usage_amount: input.usage_amount,
                    unit: input.unit,
                    timestamp: input.timestamp,
                    source: input.source,
                    destination: input.destination,
                    is_rated: false,
                    rating_status: RatingStatus::Pending,
                    rated_amount: None,
                    currency: input.currency,
                    cost: None,
                    metadata: input.metadata,
                    created_utc: now,
                };
                self.records.insert(record.id, record.clone());
                slot.insert(record.id);
                info!(record_id = %record.id, usage_type = record.usage_type.as_str(), "Usage record ingested");
                (record, false)
            }
        };

        timer.observe_duration();
        Ok(result)
    }

    /// Get a usage record by id.
    pub fn get_usage_record(&self, record_id: Uuid) -> Option<UsageRecord> {
        self.records.get(&record_id).map(|r| r.clone())
    }

    /// List usage records with filtering, sorting and pagination.
    #[instrument(skip(self, filter))]
    pub fn list_usage_records(&self, filter: &ListUsageFilter) -> (Vec<UsageRecord>, usize) {
        let timer = STORE_OP_DURATION
            .with_label_values(&["list_usage_records"])
            .start_timer();

        let mut items: Vec<UsageRecord> = self
            .records
            .iter()
            .filter(|r| {
                filter.customer_id.map_or(true, |c| r.customer_id == c)
                    && filter
                        .subscription_id
                        .map_or(true, |s| r.subscription_id == Some(s))
                    && filter.usage_type.map_or(true, |t| r.usage_type == t)
                    && filter.unrated.map_or(true, |u| r.is_rated != u)
            })
            .map(|r| r.clone())
            .collect();

        let (field, descending) = parse_sort(&filter.sort);
        match field.as_deref() {
            Some("timestamp") => items.sort_by_key(|r| r.timestamp),
            Some("usageAmount") => items.sort_by(|a, b| a.usage_amount.cmp(&b.usage_amount)),
            _ => items.sort_by_key(|r| r.created_utc),
        }
        if descending {
            items.reverse();
        }

        let page = paginate(items, filter.page, filter.size);
        timer.observe_duration();
        page
    }

    /// Usage records still PENDING, for the background rating sweep.
    pub fn pending_usage_records(&self) -> Vec<UsageRecord> {
        self.records
            .iter()
            .filter(|r| r.rating_status == RatingStatus::Pending)
            .map(|r| r.clone())
            .collect()
    }

    /// Unrated records of a customer with event time in `[start, end)`.
    pub fn unrated_in_window(
        &self,
        customer_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<UsageRecord> {
        self.records
            .iter()
            .filter(|r| {
                r.customer_id == customer_id
                    && !r.is_rated
                    && r.timestamp >= start
                    && r.timestamp < end
            })
            .map(|r| r.clone())
            .collect()
    }

    /// Rated records of a customer with event time in `[start, end)`.
    pub fn rated_in_window(
        &self,
        customer_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<UsageRecord> {
        self.records
            .iter()
            .filter(|r| {
                r.customer_id == customer_id
                    && r.is_rated
                    && r.timestamp >= start
                    && r.timestamp < end
            })
            .map(|r| r.clone())
            .collect()
    }

    /// Apply a terminal rating to a record. Records rate exactly once: an
    /// already-rated record is returned unchanged.
    #[instrument(skip(self), fields(record_id = %record_id))]
    pub fn apply_rating(
        &self,
        record_id: Uuid,
        status: RatingStatus,
        rated_amount: Decimal,
        cost: Decimal,
    ) -> Result<UsageRecord, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["apply_rating"])
            .start_timer();

        let mut record = self.records.get_mut(&record_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Usage record not found"))
        })?;

        if record.is_rated {
            let current = record.clone();
            timer.observe_duration();
            return Ok(current);
        }

        record.rating_status = status;
        record.is_rated = status.is_rated();
        record.rated_amount = Some(rated_amount);
        record.cost = Some(cost);
        let updated = record.clone();
        drop(record);

        timer.observe_duration();
        Ok(updated)
    }

    // =========================================================================
    // Billing Cycle Operations
    // =========================================================================

    /// Create a new PENDING billing cycle.
    ///
    /// Assigns the next per-customer cycle number and rejects windows that
    /// overlap an existing non-cancelled cycle of the same customer. The
    /// per-customer counter entry doubles as the creation lock.
    #[instrument(skip(self, input), fields(customer_id = %input.customer_id))]
    pub fn create_cycle(
        &self,
        input: &CreateCycle,
        default_currency: &str,
    ) -> Result<BillingCycle, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["create_cycle"])
            .start_timer();

        if input.end_date <= input.start_date {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "endDate must be after startDate"
            )));
        }

        let mut counter = self.cycle_numbers.entry(input.customer_id).or_insert(0);

        let mut previous_end: Option<DateTime<Utc>> = None;
        for cycle in self.cycles.iter() {
            if cycle.customer_id != input.customer_id || cycle.status == CycleStatus::Cancelled {
                continue;
            }
            if cycle.start_date < input.end_date && input.start_date < cycle.end_date {
                return Err(AppError::Conflict(anyhow::anyhow!(
                    "cycle window overlaps cycle {}",
                    cycle.cycle_number
                )));
            }
            if previous_end.map_or(true, |e| cycle.end_date > e) {
                previous_end = Some(cycle.end_date);
            }
        }
        if let Some(end) = previous_end {
            if end != input.start_date {
                warn!(customer_id = %input.customer_id, "Cycle window is not contiguous with previous cycle");
            }
        }

        *counter += 1;
        let now = Utc::now();
        let cycle = BillingCycle {
            id: Uuid::new_v4(),
            customer_id: input.customer_id,
            cycle_number: *counter,
            start_date: input.start_date,
            end_date: input.end_date,
            due_date: input.due_date,
            status: CycleStatus::Pending,
            total_usage: Decimal::ZERO,
            total_cost: Decimal::ZERO,
            total_rated_cost: Decimal::ZERO,
            currency: default_currency.to_string(),
            invoice_id: None,
            unrated_record_ids: Vec::new(),
            error_message: None,
            created_utc: now,
            updated_utc: now,
        };
        self.cycles.insert(cycle.id, cycle.clone());
        drop(counter);

        timer.observe_duration();
        info!(cycle_id = %cycle.id, cycle_number = cycle.cycle_number, "Billing cycle created");
        Ok(cycle)
    }

    /// Get a billing cycle by id.
    pub fn get_cycle(&self, cycle_id: Uuid) -> Option<BillingCycle> {
        self.cycles.get(&cycle_id).map(|c| c.clone())
    }

    /// List billing cycles with filtering, sorting and pagination.
    #[instrument(skip(self, filter))]
    pub fn list_cycles(&self, filter: &ListCyclesFilter) -> (Vec<BillingCycle>, usize) {
        let timer = STORE_OP_DURATION
            .with_label_values(&["list_cycles"])
            .start_timer();

        let mut items: Vec<BillingCycle> = self
            .cycles
            .iter()
            .filter(|c| {
                filter.customer_id.map_or(true, |id| c.customer_id == id)
                    && filter.status.map_or(true, |s| c.status == s)
            })
            .map(|c| c.clone())
            .collect();

        let (field, descending) = parse_sort(&filter.sort);
        match field.as_deref() {
            Some("startDate") => items.sort_by_key(|c| c.start_date),
            Some("cycleNumber") => items.sort_by_key(|c| (c.customer_id, c.cycle_number)),
            _ => items.sort_by_key(|c| c.created_utc),
        }
        if descending {
            items.reverse();
        }

        let page = paginate(items, filter.page, filter.size);
        timer.observe_duration();
        page
    }

    /// Transition a cycle through the closed state table, applying `apply`
    /// to the cycle under the same guard. Unlisted transitions are
    /// rejected with Conflict before any state changes.
    #[instrument(skip(self, apply), fields(cycle_id = %cycle_id, next = next.as_str()))]
    pub fn transition_cycle(
        &self,
        cycle_id: Uuid,
        next: CycleStatus,
        apply: impl FnOnce(&mut BillingCycle),
    ) -> Result<BillingCycle, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["transition_cycle"])
            .start_timer();

        let mut cycle = self.cycles.get_mut(&cycle_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Billing cycle not found"))
        })?;

        if !cycle.status.can_transition_to(next) {
            let err = AppError::Conflict(anyhow::anyhow!(
                "illegal cycle transition {} -> {}",
                cycle.status.as_str(),
                next.as_str()
            ));
            timer.observe_duration();
            return Err(err);
        }

        cycle.status = next;
        cycle.updated_utc = Utc::now();
        apply(&mut cycle);
        let updated = cycle.clone();
        drop(cycle);

        timer.observe_duration();
        info!(cycle_id = %cycle_id, status = updated.status.as_str(), "Cycle transitioned");
        Ok(updated)
    }

    /// Acquire the per-customer processing slot for a cycle. Exactly one
    /// cycle per customer may hold it; losers get Conflict and retry.
    pub fn begin_processing(&self, customer_id: Uuid, cycle_id: Uuid) -> Result<(), AppError> {
        match self.processing.entry(customer_id) {
            Entry::Occupied(held) => Err(AppError::Conflict(anyhow::anyhow!(
                "cycle {} is already processing for this customer",
                held.get()
            ))),
            Entry::Vacant(slot) => {
                slot.insert(cycle_id);
                Ok(())
            }
        }
    }

    /// Release the per-customer processing slot if held by this cycle.
    pub fn end_processing(&self, customer_id: Uuid, cycle_id: Uuid) {
        self.processing
            .remove_if(&customer_id, |_, held| *held == cycle_id);
    }

    // =========================================================================
    // Cost Model Operations
    // =========================================================================

    /// Create a cost model. Model names are unique.
    #[instrument(skip(self, input), fields(model_name = %input.model_name))]
    pub fn create_cost_model(&self, input: &CreateCostModel) -> Result<CostModel, AppError> {
        let timer = STORE_OP_DURATION
            .with_label_values(&["create_cost_model"])
            .start_timer();

        let result = match self.model_names.entry(input.model_name.clone()) {
            Entry::Occupied(_) => Err(AppError::Conflict(anyhow::anyhow!(
                "cost model name already exists"
            ))),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                let model = CostModel {
                    id: Uuid::new_v4(),
                    model_name: input.model_name.clone(),
                    resource_type: input.resource_type.clone(),
                    billing_period: input.billing_period,
                    base_cost: input.base_cost,
                    overage_rate: input.overage_rate,
                    included_usage: input.included_usage,
                    currency: input.currency.clone(),
                    active: input.active,
                    created_utc: now,
                    updated_utc: now,
                };
                self.cost_models.insert(model.id, model.clone());
                slot.insert(model.id);
                info!(model_id = %model.id, resource_type = %model.resource_type, "Cost model created");
                Ok(model)
            }
        };

        timer.observe_duration();
        result
    }

    /// Get a cost model by id.
    pub fn get_cost_model(&self, model_id: Uuid) -> Option<CostModel> {
        self.cost_models.get(&model_id).map(|m| m.clone())
    }

    /// List cost models, optionally only active ones.
    pub fn list_cost_models(&self, active_only: bool) -> Vec<CostModel> {
        let mut models: Vec<CostModel> = self
            .cost_models
            .iter()
            .filter(|m| !active_only || m.active)
            .map(|m| m.clone())
            .collect();
        models.sort_by(|a, b| a.model_name.cmp(&b.model_name));
        models
    }

    /// Update a cost model.
    #[instrument(skip(self, input), fields(model_id = %model_id))]
    pub fn update_cost_model(
        &self,
        model_id: Uuid,
        input: &UpdateCostModel,
    ) -> Result<CostModel, AppError> {
        let mut model = self.cost_models.get_mut(&model_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Cost model not found"))
        })?;

        if let Some(base_cost) = input.base_cost {
            model.base_cost = base_cost;
        }
        if let Some(overage_rate) = input.overage_rate {
            model.overage_rate = overage_rate;
        }
        if let Some(included_usage) = input.included_usage {
            model.included_usage = included_usage;
        }
        if let Some(active) = input.active {
            model.active = active;
        }
        model.updated_utc = Utc::now();
        Ok(model.clone())
    }

    /// Deactivate a cost model. Models are referenced by historical rating
    /// decisions, so deletion is a deactivation.
    #[instrument(skip(self), fields(model_id = %model_id))]
    pub fn deactivate_cost_model(&self, model_id: Uuid) -> Result<CostModel, AppError> {
        let mut model = self.cost_models.get_mut(&model_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Cost model not found"))
        })?;
        model.active = false;
        model.updated_utc = Utc::now();
        info!(model_id = %model_id, "Cost model deactivated");
        Ok(model.clone())
    }

    /// Resolve the active cost model for a resource type. When several are
    /// active the most recently updated wins.
    pub fn resolve_active_model(&self, resource_type: &str) -> Option<CostModel> {
        self.cost_models
            .iter()
            .filter(|m| m.active && m.resource_type == resource_type)
            .max_by_key(|m| m.updated_utc)
            .map(|m| m.clone())
    }

    // =========================================================================
    // Cost Calculation Operations
    // =========================================================================

    /// Store a cost calculation snapshot.
    pub fn insert_calculation(&self, calculation: CostCalculation) -> CostCalculation {
        self.calculations
            .insert(calculation.id, calculation.clone());
        calculation
    }

    /// Get a cost calculation by id.
    pub fn get_calculation(&self, calculation_id: Uuid) -> Option<CostCalculation> {
        self.calculations.get(&calculation_id).map(|c| c.clone())
    }

    /// Replace a calculation under its entry guard.
    pub fn update_calculation(
        &self,
        calculation_id: Uuid,
        apply: impl FnOnce(&mut CostCalculation),
    ) -> Result<CostCalculation, AppError> {
        let mut calculation = self.calculations.get_mut(&calculation_id).ok_or_else(|| {
            AppError::NotFound(anyhow::anyhow!("Cost calculation not found"))
        })?;
        apply(&mut calculation);
        calculation.updated_utc = Utc::now();
        Ok(calculation.clone())
    }

    /// List calculations for a customer, newest period first.
    pub fn list_calculations(
        &self,
        customer_id: Option<Uuid>,
        page: usize,
        size: usize,
    ) -> (Vec<CostCalculation>, usize) {
        let mut items: Vec<CostCalculation> = self
            .calculations
            .iter()
            .filter(|c| customer_id.map_or(true, |id| c.customer_id == id))
            .map(|c| c.clone())
            .collect();
        items.sort_by_key(|c| std::cmp::Reverse(c.period_start));
        paginate(items, page, size)
    }

    /// FINAL calculations for a customer and resource type with period
    /// start in `[from, to)`, sorted by period start. Forecasting reads
    /// only these.
    pub fn final_calculations_in_range(
        &self,
        customer_id: Uuid,
        resource_type: &str,
        billing_period: crate::models::BillingPeriod,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<CostCalculation> {
        let mut items: Vec<CostCalculation> = self
            .calculations
            .iter()
            .filter(|c| {
                c.customer_id == customer_id
                    && c.resource_type == resource_type
                    && c.billing_period == billing_period
                    && c.status == CalculationStatus::Final
                    && c.period_start >= from
                    && c.period_start < to
            })
            .map(|c| c.clone())
            .collect();
        items.sort_by_key(|c| c.period_start);
        items
    }

    // =========================================================================
    // Cost Forecast Operations
    // =========================================================================

    /// Store a generated forecast.
    pub fn insert_forecast(&self, forecast: CostForecast) -> CostForecast {
        self.forecasts.insert(forecast.id, forecast.clone());
        forecast
    }

    /// Forecasts for a customer, optionally narrowed to a resource type.
    pub fn list_forecasts(
        &self,
        customer_id: Uuid,
        resource_type: Option<&str>,
    ) -> Vec<CostForecast> {
        let mut items: Vec<CostForecast> = self
            .forecasts
            .iter()
            .filter(|f| {
                f.customer_id == customer_id
                    && resource_type.map_or(true, |t| f.resource_type == t)
            })
            .map(|f| f.clone())
            .collect();
        items.sort_by_key(|f| f.period_start);
        items
    }

    /// Forecasts whose period starts at the given instant.
    pub fn list_forecasts_by_period(&self, period_start: DateTime<Utc>) -> Vec<CostForecast> {
        let mut items: Vec<CostForecast> = self
            .forecasts
            .iter()
            .filter(|f| f.period_start == period_start)
            .map(|f| f.clone())
            .collect();
        items.sort_by_key(|f| (f.customer_id, f.resource_type.clone()));
        items
    }
}

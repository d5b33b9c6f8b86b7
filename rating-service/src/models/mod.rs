//! Domain models for the rating engine.

mod calculation;
mod cost_model;
mod cycle;
mod forecast;
mod usage;

pub use calculation::{CalculateCost, CalculationStatus, CostCalculation};
pub use cost_model::{BillingPeriod, CostModel, CreateCostModel, UpdateCostModel};
pub use cycle::{BillingCycle, CreateCycle, CycleStatus, ListCyclesFilter};
pub use forecast::{CostForecast, ForecastModel, GenerateForecast, TrendDirection};
pub use usage::{IngestUsage, ListUsageFilter, RatingStatus, UsageRecord, UsageType};

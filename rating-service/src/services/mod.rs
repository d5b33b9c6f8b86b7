//! Service layer for rating-service.

mod calculations;
mod cycles;
mod forecast;
mod invoicing;
pub mod metrics;
mod rating;
mod store;

pub use calculations::CalculationService;
pub use cycles::CycleEngine;
pub use forecast::ForecastEngine;
pub use invoicing::{InvoiceGenerator, LocalInvoiceGenerator};
pub use metrics::{get_metrics, init_metrics};
pub use rating::{minor_units, round_money, RatingEngine, RatingError, SweepSummary};
pub use store::Store;

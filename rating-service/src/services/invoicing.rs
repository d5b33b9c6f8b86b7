//! Invoice generation collaborator.
//!
//! Invoice generation lives outside the rating engine; the cycle state
//! machine only records the returned invoice id. The trait seam lets the
//! engine run against the real invoicing service or a local allocator.

use crate::models::BillingCycle;
use async_trait::async_trait;
use service_core::error::AppError;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::info;
use uuid::Uuid;

#[async_trait]
pub trait InvoiceGenerator: Send + Sync {
    /// Generate an invoice for a completed aggregation and return its id.
    async fn generate_invoice(&self, cycle: &BillingCycle) -> Result<Uuid, AppError>;
}

/// Local invoice allocator used when no invoicing service is wired in.
pub struct LocalInvoiceGenerator {
    sequence: AtomicI64,
}

impl LocalInvoiceGenerator {
    pub fn new() -> Self {
        Self {
            sequence: AtomicI64::new(1),
        }
    }
}

impl Default for LocalInvoiceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvoiceGenerator for LocalInvoiceGenerator {
    async fn generate_invoice(&self, cycle: &BillingCycle) -> Result<Uuid, AppError> {
        let invoice_id = Uuid::new_v4();
        let number = self.sequence.fetch_add(1, Ordering::SeqCst);
        info!(
            cycle_id = %cycle.id,
            invoice_id = %invoice_id,
            invoice_number = number,
            total_cost = %cycle.total_cost,
            "Invoice generated"
        );
        Ok(invoice_id)
    }
}

//! Billing cycle state machine tests: transitions, exclusivity,
//! idempotent completion and the invoice collaborator seam.

mod common;

use async_trait::async_trait;
use common::{utc, TestApp};
use rating_service::models::{BillingCycle, CycleStatus};
use rating_service::services::InvoiceGenerator;
use service_core::error::AppError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[tokio::test]
async fn create_rejects_inverted_window() {
    let app = TestApp::spawn().await;

    let response = app
        .client
        .post(format!("{}/billing/cycles", app.address))
        .json(&serde_json::json!({
            "customerId": Uuid::new_v4(),
            "startDate": utc(2026, 2, 1, 0).to_rfc3339(),
            "endDate": utc(2026, 1, 1, 0).to_rfc3339(),
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(400, response.status().as_u16());
}

#[tokio::test]
async fn create_rejects_overlapping_window() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    app.create_cycle(customer_id, utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;

    let response = app
        .client
        .post(format!("{}/billing/cycles", app.address))
        .json(&serde_json::json!({
            "customerId": customer_id,
            "startDate": utc(2026, 1, 15, 0).to_rfc3339(),
            "endDate": utc(2026, 2, 15, 0).to_rfc3339(),
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(409, response.status().as_u16());
}

#[tokio::test]
async fn cycle_numbers_are_monotonic_per_customer() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    let first = app
        .create_cycle(customer_id, utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;
    let second = app
        .create_cycle(customer_id, utc(2026, 2, 1, 0), utc(2026, 3, 1, 0))
        .await;
    let other_customer = app
        .create_cycle(Uuid::new_v4(), utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;

    assert_eq!(1, first.cycle_number);
    assert_eq!(2, second.cycle_number);
    assert_eq!(1, other_customer.cycle_number);
}

#[tokio::test]
async fn process_defaults_due_date_from_payment_terms() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    let cycle = app
        .create_cycle(customer_id, utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;
    assert!(cycle.due_date.is_none());

    let processed = app.process_cycle(cycle.id).await;
    assert_eq!(
        Some(utc(2026, 2, 15, 0)),
        processed.due_date,
        "due date should be end date plus 14-day payment terms"
    );
}

#[tokio::test]
async fn process_is_idempotent_once_completed() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    let cycle = app
        .create_cycle(customer_id, utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;
    let completed = app.process_cycle(cycle.id).await;
    assert_eq!(CycleStatus::Completed, completed.status);

    let replay = app.process_cycle(cycle.id).await;
    assert_eq!(CycleStatus::Completed, replay.status);
    assert_eq!(completed.invoice_id, replay.invoice_id);
    assert_eq!(completed.updated_utc, replay.updated_utc);
}

#[tokio::test]
async fn concurrent_processing_for_one_customer_conflicts() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    // An unrateable straggler keeps the winner inside its grace loop long
    // enough for the loser to collide with it.
    app.ingest_usage(customer_id, "VOICE", 10.0, utc(2026, 1, 10, 9), "cdr-1")
        .await;
    app.ingest_usage(customer_id, "VOICE", 10.0, utc(2026, 2, 10, 9), "cdr-1")
        .await;

    let first = app
        .create_cycle(customer_id, utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;
    let second = app
        .create_cycle(customer_id, utc(2026, 2, 1, 0), utc(2026, 3, 1, 0))
        .await;

    let url_a = format!("{}/billing/cycles/{}/process", app.address, first.id);
    let url_b = format!("{}/billing/cycles/{}/process", app.address, second.id);
    let (res_a, res_b) = tokio::join!(
        app.client.post(&url_a).send(),
        app.client.post(&url_b).send()
    );

    let statuses = [res_a.unwrap().status(), res_b.unwrap().status()];
    let conflicts = statuses.iter().filter(|s| s.as_u16() == 409).count();
    let accepted = statuses.iter().filter(|s| s.as_u16() == 200).count();
    assert_eq!(1, conflicts, "exactly one call must lose the race");
    assert_eq!(1, accepted);
}

#[tokio::test]
async fn cancel_is_rejected_outside_pending_and_scheduled() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    let cycle = app
        .create_cycle(customer_id, utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;
    let completed = app.process_cycle(cycle.id).await;
    assert_eq!(CycleStatus::Completed, completed.status);

    // COMPLETED is immutable: the transition table rejects cancellation.
    assert!(!completed.status.can_transition_to(CycleStatus::Cancelled));
    assert!(!CycleStatus::Processing.can_transition_to(CycleStatus::Cancelled));
    assert!(CycleStatus::Pending.can_transition_to(CycleStatus::Cancelled));
    assert!(CycleStatus::Scheduled.can_transition_to(CycleStatus::Cancelled));
}

#[tokio::test]
async fn transition_table_rejects_unlisted_moves() {
    use CycleStatus::*;

    for terminal in [Completed, Cancelled] {
        for next in [Pending, Scheduled, Processing, Completed, Failed, Cancelled] {
            assert!(
                !terminal.can_transition_to(next),
                "{:?} must be immutable",
                terminal
            );
        }
    }

    assert!(Pending.can_transition_to(Scheduled));
    assert!(Scheduled.can_transition_to(Processing));
    assert!(Processing.can_transition_to(Completed));
    assert!(Processing.can_transition_to(Failed));
    assert!(Failed.can_transition_to(Processing));

    assert!(!Pending.can_transition_to(Processing));
    assert!(!Scheduled.can_transition_to(Completed));
    assert!(!Failed.can_transition_to(Completed));
    assert!(!Processing.can_transition_to(Scheduled));
}

/// Invoice generator that fails its first call, then recovers.
struct FlakyInvoicer {
    failed_once: AtomicBool,
}

#[async_trait]
impl InvoiceGenerator for FlakyInvoicer {
    async fn generate_invoice(&self, _cycle: &BillingCycle) -> Result<Uuid, AppError> {
        if self.failed_once.swap(true, Ordering::SeqCst) {
            Ok(Uuid::new_v4())
        } else {
            Err(AppError::ServiceUnavailable)
        }
    }
}

#[tokio::test]
async fn invoice_failure_fails_cycle_and_retry_completes_it() {
    let app = TestApp::spawn_with_invoicer(Arc::new(FlakyInvoicer {
        failed_once: AtomicBool::new(false),
    }))
    .await;
    let customer_id = Uuid::new_v4();

    app.create_data_model("data-flaky", 2.0, 0.1, 10.0).await;
    app.ingest_usage(customer_id, "DATA", 25.0, utc(2026, 1, 10, 9), "cdr-1")
        .await;

    let cycle = app
        .create_cycle(customer_id, utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;

    let failed = app.process_cycle(cycle.id).await;
    assert_eq!(CycleStatus::Failed, failed.status);
    assert!(failed.invoice_id.is_none());
    assert!(failed
        .error_message
        .as_deref()
        .unwrap_or_default()
        .contains("invoice generation failed"));

    let completed = app.process_cycle(cycle.id).await;
    assert_eq!(CycleStatus::Completed, completed.status);
    assert!(completed.invoice_id.is_some());
}

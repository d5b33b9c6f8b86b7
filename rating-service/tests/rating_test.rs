//! Rating engine integration tests: included-usage apportionment, the
//! flat-plus-overage math and unrateable records.

mod common;

use common::{dec, utc, TestApp};
use rating_service::models::{CycleStatus, RatingStatus, UsageRecord};
use rust_decimal::Decimal;
use uuid::Uuid;

#[tokio::test]
async fn flat_plus_overage_cycle_totals() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    app.create_data_model("data-standard", 10.0, 0.5, 100.0).await;
    app.ingest_usage(customer_id, "DATA", 60.0, utc(2026, 1, 10, 9), "cdr-1")
        .await;
    app.ingest_usage(customer_id, "DATA", 80.0, utc(2026, 1, 20, 9), "cdr-1")
        .await;

    let cycle = app
        .create_cycle(customer_id, utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;
    let processed = app.process_cycle(cycle.id).await;

    // 140 units against 100 included: 40 billable at 0.5 plus the 10 base.
    assert_eq!(CycleStatus::Completed, processed.status);
    assert_eq!(dec("140"), processed.total_usage);
    assert_eq!(dec("20.00"), processed.total_rated_cost);
    assert_eq!(dec("30.00"), processed.total_cost);
    assert_eq!("USD", processed.currency);
    assert!(processed.invoice_id.is_some());
}

#[tokio::test]
async fn completed_cycle_conserves_record_costs() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    app.create_data_model("data-conservation", 7.5, 0.25, 50.0)
        .await;
    for (day, amount) in [(3, 30.0), (9, 45.0), (17, 12.5), (25, 80.0)] {
        app.ingest_usage(
            customer_id,
            "DATA",
            amount,
            utc(2026, 2, day, 10),
            "cdr-1",
        )
        .await;
    }

    let cycle = app
        .create_cycle(customer_id, utc(2026, 2, 1, 0), utc(2026, 3, 1, 0))
        .await;
    let processed = app.process_cycle(cycle.id).await;
    assert_eq!(CycleStatus::Completed, processed.status);

    let page = app.list_usage(customer_id).await;
    let sum: Decimal = page
        .content
        .iter()
        .map(|r| r.cost.unwrap_or(Decimal::ZERO))
        .sum();
    assert_eq!(sum, processed.total_cost);
    assert!(page.content.iter().all(|r| r.is_rated));
}

#[tokio::test]
async fn included_usage_apportionment_is_order_independent() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    // Zero base cost: the only charge is overage beyond 100 included units.
    app.create_data_model("data-included", 0.0, 0.5, 100.0).await;
    app.ingest_usage(customer_id, "DATA", 60.0, utc(2026, 1, 5, 9), "cdr-a")
        .await;
    app.ingest_usage(customer_id, "DATA", 60.0, utc(2026, 1, 25, 9), "cdr-b")
        .await;

    let cycle = app
        .create_cycle(customer_id, utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;
    let processed = app.process_cycle(cycle.id).await;
    assert_eq!(CycleStatus::Completed, processed.status);

    let page = app.list_usage(customer_id).await;
    let mut statuses: Vec<(RatingStatus, Decimal)> = page
        .content
        .iter()
        .map(|r| (r.rating_status, r.cost.unwrap()))
        .collect();
    statuses.sort_by(|a, b| a.1.cmp(&b.1));

    // Whichever record rated first is fully covered; the other pays for 20
    // units of overage.
    assert_eq!(
        vec![
            (RatingStatus::Included, dec("0")),
            (RatingStatus::Billable, dec("10.00")),
        ],
        statuses
    );
    assert_eq!(dec("10.00"), processed.total_cost);
}

#[tokio::test]
async fn records_without_cost_model_stay_pending_and_fail_the_cycle() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    // No VOICE model exists.
    let record = app
        .ingest_usage(customer_id, "VOICE", 30.0, utc(2026, 1, 10, 9), "cdr-1")
        .await;

    let cycle = app
        .create_cycle(customer_id, utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;
    let processed = app.process_cycle(cycle.id).await;

    assert_eq!(CycleStatus::Failed, processed.status);
    assert_eq!(vec![record.id], processed.unrated_record_ids);
    assert!(processed.error_message.is_some());

    // The record is still PENDING, awaiting operator remediation.
    let fetched: UsageRecord = app
        .client
        .get(format!(
            "{}/billing/usage-records/{}",
            app.address, record.id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(RatingStatus::Pending, fetched.rating_status);
    assert!(!fetched.is_rated);
}

#[tokio::test]
async fn failed_cycle_completes_after_model_is_added() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    app.ingest_usage(customer_id, "DATA", 150.0, utc(2026, 1, 10, 9), "cdr-1")
        .await;
    let cycle = app
        .create_cycle(customer_id, utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;

    let failed = app.process_cycle(cycle.id).await;
    assert_eq!(CycleStatus::Failed, failed.status);

    // Operator remediation: register the missing model, then retry.
    app.create_data_model("data-late", 5.0, 0.1, 100.0).await;
    let completed = app.process_cycle(cycle.id).await;

    assert_eq!(CycleStatus::Completed, completed.status);
    assert!(completed.unrated_record_ids.is_empty());
    // 50 billable units at 0.1 plus the 5 base.
    assert_eq!(dec("10.00"), completed.total_cost);
}

#[tokio::test]
async fn included_period_resets_between_months() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    app.create_data_model("data-reset", 0.0, 1.0, 100.0).await;
    app.ingest_usage(customer_id, "DATA", 90.0, utc(2026, 1, 10, 9), "cdr-1")
        .await;
    app.ingest_usage(customer_id, "DATA", 90.0, utc(2026, 2, 10, 9), "cdr-1")
        .await;

    let january = app
        .create_cycle(customer_id, utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;
    let february = app
        .create_cycle(customer_id, utc(2026, 2, 1, 0), utc(2026, 3, 1, 0))
        .await;

    let jan = app.process_cycle(january.id).await;
    let feb = app.process_cycle(february.id).await;

    // Each month gets its own 100 included units, so neither overflows.
    assert_eq!(dec("0"), jan.total_cost);
    assert_eq!(dec("0"), feb.total_cost);
}

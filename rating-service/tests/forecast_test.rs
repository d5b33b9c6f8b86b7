//! Forecast engine tests: degenerate history, linear regression and
//! moving average over FINAL calculations.

mod common;

use common::{dec, utc, TestApp};
use rating_service::models::{CostCalculation, CostForecast, ForecastModel, TrendDirection};
use uuid::Uuid;

/// Build a FINAL calculation for one month of rated DATA usage.
async fn finalized_month(app: &TestApp, customer_id: Uuid, month: u32, amount: f64) {
    app.ingest_usage(
        customer_id,
        "DATA",
        amount,
        utc(2026, month, 10, 9),
        "cdr-1",
    )
    .await;
    let cycle = app
        .create_cycle(
            customer_id,
            utc(2026, month, 1, 0),
            utc(2026, month + 1, 1, 0),
        )
        .await;
    app.process_cycle(cycle.id).await;

    let response = app
        .client
        .post(format!("{}/api/monitoring/cost-calculations", app.address))
        .query(&[
            ("customerId", customer_id.to_string()),
            ("resourceType", "DATA".to_string()),
            ("billingPeriod", "monthly".to_string()),
            ("periodStart", utc(2026, month, 1, 0).to_rfc3339()),
            ("periodEnd", utc(2026, month + 1, 1, 0).to_rfc3339()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(201, response.status().as_u16());
    let draft: CostCalculation = response.json().await.unwrap();

    let finalize = app
        .client
        .post(format!(
            "{}/api/monitoring/cost-calculations/{}/finalize",
            app.address, draft.id
        ))
        .send()
        .await
        .unwrap();
    assert_eq!(200, finalize.status().as_u16());
}

async fn generate(
    app: &TestApp,
    customer_id: Uuid,
    model: &str,
    start_month: u32,
    end_month: u32,
) -> Vec<CostForecast> {
    let response = app
        .client
        .post(format!(
            "{}/api/monitoring/cost-forecasts/generate",
            app.address
        ))
        .query(&[
            ("customerId", customer_id.to_string()),
            ("resourceType", "DATA".to_string()),
            ("billingPeriod", "monthly".to_string()),
            (
                "forecastStartDate",
                utc(2026, start_month, 1, 0).to_rfc3339(),
            ),
            ("forecastEndDate", utc(2026, end_month, 1, 0).to_rfc3339()),
            ("historicalMonths", "6".to_string()),
            ("forecastModel", model.to_string()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(201, response.status().as_u16());
    response.json().await.unwrap()
}

#[tokio::test]
async fn no_history_yields_single_low_confidence_flat_forecast() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    let forecasts = generate(&app, customer_id, "LINEAR_REGRESSION", 4, 6).await;

    assert_eq!(1, forecasts.len());
    let only = &forecasts[0];
    assert_eq!(TrendDirection::Stable, only.trend_direction);
    assert_eq!(dec("0"), only.predicted_cost);
    assert!(
        only.confidence_level < 0.5,
        "degenerate forecast must be flagged low confidence"
    );
}

#[tokio::test]
async fn single_point_history_yields_flat_forecast_at_last_cost() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    // {base 10, rate 0.5, included 100}: 150 units -> 10 + 25 = 35.
    app.create_data_model("data-fc-single", 10.0, 0.5, 100.0).await;
    finalized_month(&app, customer_id, 1, 150.0).await;

    let forecasts = generate(&app, customer_id, "MOVING_AVERAGE", 4, 6).await;

    assert_eq!(1, forecasts.len());
    let only = &forecasts[0];
    assert_eq!(TrendDirection::Stable, only.trend_direction);
    assert_eq!(dec("35.00"), only.predicted_cost);
    assert_eq!(only.predicted_cost, only.lower_bound);
    assert_eq!(only.predicted_cost, only.upper_bound);
    assert!(only.confidence_level < 0.5);
}

#[tokio::test]
async fn linear_regression_projects_increasing_trend() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    // Monthly totals 35, 85, 135: an exact fit with slope 50 per period.
    app.create_data_model("data-fc-ols", 10.0, 0.5, 100.0).await;
    finalized_month(&app, customer_id, 1, 150.0).await;
    finalized_month(&app, customer_id, 2, 250.0).await;
    finalized_month(&app, customer_id, 3, 350.0).await;

    let forecasts = generate(&app, customer_id, "LINEAR_REGRESSION", 4, 6).await;

    assert!(!forecasts.is_empty());
    let first = &forecasts[0];
    assert_eq!(ForecastModel::LinearRegression, first.forecast_model);
    assert_eq!(TrendDirection::Increasing, first.trend_direction);
    // Next index on the fitted line: 35 + 50 * 3.
    assert_eq!(dec("185.00"), first.predicted_cost);
    assert!(first.lower_bound >= dec("0"));
    assert!(first.upper_bound > first.predicted_cost);
    assert!((first.confidence_level - 0.65).abs() < 1e-9);

    // Bounds derive from residual deviation around the prediction.
    assert!(first.upper_bound > first.lower_bound);
}

#[tokio::test]
async fn moving_average_projects_trailing_mean() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    app.create_data_model("data-fc-ma", 10.0, 0.5, 100.0).await;
    finalized_month(&app, customer_id, 1, 150.0).await;
    finalized_month(&app, customer_id, 2, 250.0).await;
    finalized_month(&app, customer_id, 3, 350.0).await;

    let forecasts = generate(&app, customer_id, "MOVING_AVERAGE", 4, 5).await;

    assert!(!forecasts.is_empty());
    let first = &forecasts[0];
    assert_eq!(ForecastModel::MovingAverage, first.forecast_model);
    // Trailing mean of 35, 85, 135.
    assert_eq!(dec("85.00"), first.predicted_cost);
    assert_eq!(TrendDirection::Increasing, first.trend_direction);
    assert!((first.confidence_level - 0.7).abs() < 1e-9);
}

#[tokio::test]
async fn draft_calculations_are_invisible_to_forecasting() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    app.create_data_model("data-fc-draft", 10.0, 0.5, 100.0).await;
    // Rate January usage and calculate, but never finalize.
    app.ingest_usage(customer_id, "DATA", 150.0, utc(2026, 1, 10, 9), "cdr-1")
        .await;
    let cycle = app
        .create_cycle(customer_id, utc(2026, 1, 1, 0), utc(2026, 2, 1, 0))
        .await;
    app.process_cycle(cycle.id).await;
    let response = app
        .client
        .post(format!("{}/api/monitoring/cost-calculations", app.address))
        .query(&[
            ("customerId", customer_id.to_string()),
            ("resourceType", "DATA".to_string()),
            ("billingPeriod", "monthly".to_string()),
            ("periodStart", utc(2026, 1, 1, 0).to_rfc3339()),
            ("periodEnd", utc(2026, 2, 1, 0).to_rfc3339()),
        ])
        .send()
        .await
        .unwrap();
    assert_eq!(201, response.status().as_u16());

    // Only DRAFT history exists, so the forecast degrades to flat zero.
    let forecasts = generate(&app, customer_id, "LINEAR_REGRESSION", 4, 6).await;
    assert_eq!(1, forecasts.len());
    assert_eq!(dec("0"), forecasts[0].predicted_cost);
}

#[tokio::test]
async fn forecast_projections_are_queryable() {
    let app = TestApp::spawn().await;
    let customer_id = Uuid::new_v4();

    let generated = generate(&app, customer_id, "MOVING_AVERAGE", 4, 6).await;
    assert_eq!(1, generated.len());

    let by_customer: Vec<CostForecast> = app
        .client
        .get(format!(
            "{}/api/monitoring/cost-forecasts/customer/{}",
            app.address, customer_id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(1, by_customer.len());
    assert_eq!(generated[0].id, by_customer[0].id);

    let by_resource: Vec<CostForecast> = app
        .client
        .get(format!(
            "{}/api/monitoring/cost-forecasts/customer/{}/resource/DATA",
            app.address, customer_id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(1, by_resource.len());

    let by_other_resource: Vec<CostForecast> = app
        .client
        .get(format!(
            "{}/api/monitoring/cost-forecasts/customer/{}/resource/VOICE",
            app.address, customer_id
        ))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(by_other_resource.is_empty());
}

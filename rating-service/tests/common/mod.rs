//! Test helper module for rating-service integration tests.
//!
//! Spawns the full application on a random port and drives it over HTTP.

#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rating_service::config::{
    BillingCycleConfig, ForecastConfig, IngestConfig, RatingConfig, RatingEngineConfig,
};
use rating_service::dtos::Page;
use rating_service::models::{BillingCycle, CostModel, UsageRecord};
use rating_service::services::InvoiceGenerator;
use rating_service::startup::Application;
use rust_decimal::Decimal;
use service_core::config::Config as CoreConfig;
use std::sync::Arc;
use uuid::Uuid;

/// Test application wrapper for integration tests.
pub struct TestApp {
    pub address: String,
    pub port: u16,
    pub client: reqwest::Client,
}

/// Configuration with timings tightened for tests.
pub fn test_config() -> RatingConfig {
    RatingConfig {
        common: CoreConfig { port: 0 },
        service_name: "rating-service-test".to_string(),
        log_level: "warn".to_string(),
        otlp_endpoint: None,
        ingest: IngestConfig {
            max_future_skew_secs: 300,
        },
        rating: RatingEngineConfig {
            sweep_interval_secs: 3600,
            straggler_grace_millis: 500,
            straggler_retry_millis: 50,
        },
        billing: BillingCycleConfig {
            payment_terms_days: 14,
            default_currency: "USD".to_string(),
        },
        forecast: ForecastConfig {
            trend_threshold: 0.1,
            max_periods: 36,
        },
    }
}

impl TestApp {
    /// Spawn a new test application on a random port.
    pub async fn spawn() -> Self {
        let app = Application::build(test_config())
            .await
            .expect("Failed to build test application");
        Self::launch(app).await
    }

    /// Spawn with a custom invoice generator.
    pub async fn spawn_with_invoicer(invoicer: Arc<dyn InvoiceGenerator>) -> Self {
        let app = Application::build_with_invoicer(test_config(), invoicer)
            .await
            .expect("Failed to build test application");
        Self::launch(app).await
    }

    async fn launch(app: Application) -> Self {
        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to be ready by polling the health endpoint.
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp {
            address,
            port,
            client,
        }
    }

    /// Ingest a usage record and return the stored representation.
    pub async fn ingest_usage(
        &self,
        customer_id: Uuid,
        usage_type: &str,
        amount: f64,
        timestamp: DateTime<Utc>,
        source: &str,
    ) -> UsageRecord {
        let response = self
            .client
            .post(format!("{}/billing/usage-records", self.address))
            .json(&serde_json::json!({
                "customerId": customer_id,
                "usageType": usage_type,
                "usageAmount": amount,
                "unit": "MB",
                "timestamp": timestamp.to_rfc3339(),
                "source": source,
                "currency": "USD",
            }))
            .send()
            .await
            .expect("Failed to ingest usage record");
        assert_eq!(201, response.status().as_u16());
        response.json().await.expect("Failed to parse usage record")
    }

    /// Create an active monthly DATA cost model.
    pub async fn create_data_model(
        &self,
        model_name: &str,
        base_cost: f64,
        overage_rate: f64,
        included_usage: f64,
    ) -> CostModel {
        let response = self
            .client
            .post(format!("{}/api/monitoring/cost-models", self.address))
            .query(&[
                ("modelName", model_name.to_string()),
                ("resourceType", "DATA".to_string()),
                ("billingPeriod", "monthly".to_string()),
                ("baseCost", base_cost.to_string()),
                ("overageRate", overage_rate.to_string()),
                ("includedUsage", included_usage.to_string()),
                ("currency", "USD".to_string()),
            ])
            .send()
            .await
            .expect("Failed to create cost model");
        assert_eq!(201, response.status().as_u16());
        response.json().await.expect("Failed to parse cost model")
    }

    /// Create a PENDING billing cycle.
    pub async fn create_cycle(
        &self,
        customer_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> BillingCycle {
        let response = self
            .client
            .post(format!("{}/billing/cycles", self.address))
            .json(&serde_json::json!({
                "customerId": customer_id,
                "startDate": start.to_rfc3339(),
                "endDate": end.to_rfc3339(),
            }))
            .send()
            .await
            .expect("Failed to create cycle");
        assert_eq!(201, response.status().as_u16());
        response.json().await.expect("Failed to parse cycle")
    }

    /// Run the processing workflow for a cycle.
    pub async fn process_cycle(&self, cycle_id: Uuid) -> BillingCycle {
        let response = self
            .client
            .post(format!("{}/billing/cycles/{}/process", self.address, cycle_id))
            .send()
            .await
            .expect("Failed to process cycle");
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse cycle")
    }

    /// List usage records for a customer.
    pub async fn list_usage(&self, customer_id: Uuid) -> Page<UsageRecord> {
        let response = self
            .client
            .get(format!(
                "{}/billing/usage-records?customerId={}",
                self.address, customer_id
            ))
            .send()
            .await
            .expect("Failed to list usage records");
        assert_eq!(200, response.status().as_u16());
        response.json().await.expect("Failed to parse usage page")
    }
}

/// A UTC timestamp helper.
pub fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0).unwrap()
}

/// Decimal from a string literal.
pub fn dec(s: &str) -> Decimal {
    s.parse().unwrap()
}

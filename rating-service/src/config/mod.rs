//! Configuration for rating-service.

use anyhow::Result;
use dotenvy::dotenv;
use serde::Deserialize;
use service_core::config::Config as CoreConfig;
use std::env;

/// Ingest buffer settings.
#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Maximum tolerated clock skew for event timestamps, in seconds.
    /// Records stamped further in the future are rejected.
    pub max_future_skew_secs: i64,
}

/// Rating engine settings.
#[derive(Debug, Deserialize, Clone)]
pub struct RatingEngineConfig {
    /// Interval between background sweeps over PENDING records.
    pub sweep_interval_secs: u64,
    /// Grace period a processing cycle waits for straggler records.
    pub straggler_grace_millis: u64,
    /// Delay between straggler rating attempts within the grace period.
    pub straggler_retry_millis: u64,
}

/// Billing cycle settings.
#[derive(Debug, Deserialize, Clone)]
pub struct BillingCycleConfig {
    /// Days between a cycle's end date and its default due date.
    pub payment_terms_days: i64,
    /// Currency applied to cycles whose window holds no rated usage.
    pub default_currency: String,
}

/// Forecast engine settings.
#[derive(Debug, Deserialize, Clone)]
pub struct ForecastConfig {
    /// Fitted slopes within +/- this threshold count as STABLE.
    pub trend_threshold: f64,
    /// Upper bound on forecast periods generated per request.
    pub max_periods: usize,
}

/// Top-level service configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct RatingConfig {
    pub common: CoreConfig,
    pub service_name: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    pub ingest: IngestConfig,
    pub rating: RatingEngineConfig,
    pub billing: BillingCycleConfig,
    pub forecast: ForecastConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl RatingConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let port = env::var("RATING_SERVICE_PORT")
            .unwrap_or_else(|_| "3005".to_string())
            .parse()?;

        let log_level = env::var("RATING_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let otlp_endpoint = env::var("OTLP_ENDPOINT").ok();

        Ok(Self {
            common: CoreConfig { port },
            service_name: "rating-service".to_string(),
            log_level,
            otlp_endpoint,
            ingest: IngestConfig {
                max_future_skew_secs: env_parse("RATING_MAX_FUTURE_SKEW_SECS", 300),
            },
            rating: RatingEngineConfig {
                sweep_interval_secs: env_parse("RATING_SWEEP_INTERVAL_SECS", 30),
                straggler_grace_millis: env_parse("RATING_STRAGGLER_GRACE_MILLIS", 30_000),
                straggler_retry_millis: env_parse("RATING_STRAGGLER_RETRY_MILLIS", 250),
            },
            billing: BillingCycleConfig {
                payment_terms_days: env_parse("RATING_PAYMENT_TERMS_DAYS", 14),
                default_currency: env::var("RATING_DEFAULT_CURRENCY")
                    .unwrap_or_else(|_| "USD".to_string()),
            },
            forecast: ForecastConfig {
                trend_threshold: env_parse("RATING_FORECAST_TREND_THRESHOLD", 0.1),
                max_periods: env_parse("RATING_FORECAST_MAX_PERIODS", 36),
            },
        })
    }
}

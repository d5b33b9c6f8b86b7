//! Cost forecast engine.
//!
//! Reads FINAL cost calculations only and projects future cost with either
//! ordinary least squares or a trailing moving average. Forecasts are
//! derived data: generating one never mutates billing state.

use crate::config::ForecastConfig;
use crate::models::{
    CostCalculation, CostForecast, ForecastModel, GenerateForecast, TrendDirection,
};
use crate::services::metrics::record_forecast_generated;
use crate::services::Store;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Confidence attached to degenerate forecasts built from fewer than two
/// historical points.
const LOW_CONFIDENCE: f64 = 0.3;

pub struct ForecastEngine {
    store: Arc<Store>,
    trend_threshold: f64,
    max_periods: usize,
}

impl ForecastEngine {
    pub fn new(store: Arc<Store>, config: &ForecastConfig) -> Self {
        Self {
            store,
            trend_threshold: config.trend_threshold,
            max_periods: config.max_periods,
        }
    }

    /// Generate and store forecasts over the requested window.
    #[instrument(skip(self, cmd), fields(customer_id = %cmd.customer_id, resource_type = %cmd.resource_type))]
    pub fn generate(&self, cmd: &GenerateForecast) -> Result<Vec<CostForecast>, AppError> {
        if cmd.forecast_end_date < cmd.forecast_start_date {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "forecastEndDate must not precede forecastStartDate"
            )));
        }
        if cmd.historical_months <= 0 {
            return Err(AppError::BadRequest(anyhow::anyhow!(
                "historicalMonths must be positive"
            )));
        }

        let lookback_start =
            cmd.forecast_start_date - Duration::days(30 * cmd.historical_months);
        let history = self.store.final_calculations_in_range(
            cmd.customer_id,
            &cmd.resource_type,
            cmd.billing_period,
            lookback_start,
            cmd.forecast_start_date,
        );

        let forecasts = if history.len() < 2 {
            self.degenerate(cmd, &history)
        } else {
            match cmd.forecast_model {
                ForecastModel::LinearRegression => self.linear_regression(cmd, &history),
                ForecastModel::MovingAverage => self.moving_average(cmd, &history),
            }
        };

        record_forecast_generated(cmd.forecast_model.as_str());
        info!(
            customer_id = %cmd.customer_id,
            history_points = history.len(),
            forecasts = forecasts.len(),
            "Forecast generated"
        );

        Ok(forecasts
            .into_iter()
            .map(|f| self.store.insert_forecast(f))
            .collect())
    }

    /// Fewer than two points: one flat projection, STABLE, explicitly low
    /// confidence. Never an error.
    fn degenerate(&self, cmd: &GenerateForecast, history: &[CostCalculation]) -> Vec<CostForecast> {
        let predicted = history
            .last()
            .map(|c| c.total_cost)
            .unwrap_or(Decimal::ZERO);
        let period_end =
            cmd.forecast_start_date + Duration::days(cmd.billing_period.period_days());

        vec![self.build(
            cmd,
            cmd.forecast_start_date,
            period_end,
            predicted,
            predicted,
            predicted,
            TrendDirection::Stable,
            LOW_CONFIDENCE,
        )]
    }

    fn linear_regression(
        &self,
        cmd: &GenerateForecast,
        history: &[CostCalculation],
    ) -> Vec<CostForecast> {
        let n = history.len();
        let ys: Vec<f64> = history
            .iter()
            .map(|c| c.total_cost.to_f64().unwrap_or(0.0))
            .collect();

        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_xy = 0.0;
        let mut sum_x2 = 0.0;
        for (i, y) in ys.iter().enumerate() {
            let x = i as f64;
            sum_x += x;
            sum_y += y;
            sum_xy += x * y;
            sum_x2 += x * x;
        }
        let count = n as f64;
        let slope = (count * sum_xy - sum_x * sum_y) / (count * sum_x2 - sum_x * sum_x);
        let intercept = (sum_y - slope * sum_x) / count;

        let trend = if slope > self.trend_threshold {
            TrendDirection::Increasing
        } else if slope < -self.trend_threshold {
            TrendDirection::Decreasing
        } else {
            TrendDirection::Stable
        };
        let confidence = (0.5 + count * 0.05).min(0.95);

        let period_days = cmd.billing_period.period_days();
        let mut forecasts = Vec::new();
        let mut current = cmd.forecast_start_date;

        while current <= cmd.forecast_end_date && forecasts.len() < self.max_periods {
            let elapsed_periods =
                (current - cmd.forecast_start_date).num_days() / period_days;
            let future_index = count + elapsed_periods as f64;
            let predicted_y = slope * future_index + intercept;

            let sigma = residual_std_dev(&ys, predicted_y);
            let period_end = current + Duration::days(period_days);

            forecasts.push(self.build(
                cmd,
                current,
                period_end,
                decimal(predicted_y),
                decimal(predicted_y - 2.0 * sigma).max(Decimal::ZERO),
                decimal(predicted_y + 2.0 * sigma),
                trend,
                confidence,
            ));
            current = period_end;
        }

        if current <= cmd.forecast_end_date {
            warn!(
                max_periods = self.max_periods,
                "Forecast window truncated at the period cap"
            );
        }

        forecasts
    }

    fn moving_average(
        &self,
        cmd: &GenerateForecast,
        history: &[CostCalculation],
    ) -> Vec<CostForecast> {
        let window = history.len().min(3);
        let tail = &history[history.len() - window..];
        let ys: Vec<f64> = tail
            .iter()
            .map(|c| c.total_cost.to_f64().unwrap_or(0.0))
            .collect();
        let mean = ys.iter().sum::<f64>() / window as f64;
        let sigma = residual_std_dev(&ys, mean);

        let trend = half_split_trend(history);
        let confidence = 0.7;

        let period_days = cmd.billing_period.period_days();
        let mut forecasts = Vec::new();
        let mut current = cmd.forecast_start_date;

        while current <= cmd.forecast_end_date && forecasts.len() < self.max_periods {
            let period_end = current + Duration::days(period_days);
            forecasts.push(self.build(
                cmd,
                current,
                period_end,
                decimal(mean),
                decimal(mean - 2.0 * sigma).max(Decimal::ZERO),
                decimal(mean + 2.0 * sigma),
                trend,
                confidence,
            ));
            current = period_end;
        }

        if current <= cmd.forecast_end_date {
            warn!(
                max_periods = self.max_periods,
                "Forecast window truncated at the period cap"
            );
        }

        forecasts
    }

    #[allow(clippy::too_many_arguments)]
    fn build(
        &self,
        cmd: &GenerateForecast,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        predicted_cost: Decimal,
        lower_bound: Decimal,
        upper_bound: Decimal,
        trend_direction: TrendDirection,
        confidence_level: f64,
    ) -> CostForecast {
        CostForecast {
            id: Uuid::new_v4(),
            customer_id: cmd.customer_id,
            resource_type: cmd.resource_type.clone(),
            billing_period: cmd.billing_period,
            period_start,
            period_end,
            predicted_cost,
            lower_bound,
            upper_bound,
            trend_direction,
            confidence_level,
            forecast_model: cmd.forecast_model,
            created_utc: Utc::now(),
        }
    }
}

fn decimal(value: f64) -> Decimal {
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO).round_dp(2)
}

/// Standard deviation of observed values around a prediction.
fn residual_std_dev(values: &[f64], predicted: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values
        .iter()
        .map(|v| (v - predicted).powi(2))
        .sum::<f64>()
        / values.len() as f64;
    variance.sqrt()
}

/// Trend from comparing first-half and second-half means against a +/-10%
/// band.
fn half_split_trend(history: &[CostCalculation]) -> TrendDirection {
    if history.len() < 2 {
        return TrendDirection::Stable;
    }
    let half = history.len() / 2;
    let first: f64 = history[..half]
        .iter()
        .map(|c| c.total_cost.to_f64().unwrap_or(0.0))
        .sum::<f64>()
        / half as f64;
    let second: f64 = history[half..]
        .iter()
        .map(|c| c.total_cost.to_f64().unwrap_or(0.0))
        .sum::<f64>()
        / (history.len() - half) as f64;

    if second > first * 1.1 {
        TrendDirection::Increasing
    } else if second < first * 0.9 {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Stable
    }
}

//! Usage record endpoints.

use crate::dtos::{default_page_size, IngestUsageRequest, Page, UsageListQuery};
use crate::models::{IngestUsage, ListUsageFilter, UsageRecord};
use crate::services::metrics::record_usage_ingested;
use crate::startup::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Duration;
use service_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

/// Ingest one usage record. Idempotent on the dedup tuple: a replayed
/// delivery returns the already-stored record.
pub async fn ingest_usage_record(
    State(state): State<AppState>,
    Json(payload): Json<IngestUsageRequest>,
) -> Result<(StatusCode, Json<UsageRecord>), AppError> {
    payload.validate()?;

    let input = IngestUsage {
        customer_id: payload.customer_id,
        subscription_id: payload.subscription_id,
        usage_type: payload.usage_type,
        usage_amount: payload.usage_amount,
        unit: payload.unit,
        timestamp: payload.timestamp,
        source: payload.source,
        destination: payload.destination,
        currency: payload.currency,
        metadata: payload.metadata,
    };

    let max_skew = Duration::seconds(state.config.ingest.max_future_skew_secs);
    let (record, replayed) = state.store.ingest_usage(input, max_skew)?;

    record_usage_ingested(
        record.usage_type.as_str(),
        if replayed { "replayed" } else { "stored" },
    );

    Ok((StatusCode::CREATED, Json(record)))
}

/// Paginated usage record projection.
pub async fn list_usage_records(
    State(state): State<AppState>,
    Query(query): Query<UsageListQuery>,
) -> Json<Page<UsageRecord>> {
    let page = query.page.unwrap_or(0);
    let size = query.size.unwrap_or_else(default_page_size);

    let filter = ListUsageFilter {
        customer_id: query.customer_id,
        subscription_id: query.subscription_id,
        usage_type: query.usage_type,
        unrated: query.unrated,
        page,
        size,
        sort: query.sort,
    };
    let (content, total) = state.store.list_usage_records(&filter);

    Json(Page::new(content, page, size, total))
}

/// Get a usage record by id.
pub async fn get_usage_record(
    State(state): State<AppState>,
    Path(record_id): Path<Uuid>,
) -> Result<Json<UsageRecord>, AppError> {
    let record = state
        .store
        .get_usage_record(record_id)
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Usage record not found")))?;
    Ok(Json(record))
}

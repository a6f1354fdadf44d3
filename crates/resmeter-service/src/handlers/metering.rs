//! Metering handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use resmeter_core::metering::total_amount;
use resmeter_core::{bucket_start, Metering, DEFAULT_BUCKET_SECONDS};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::handlers::monitors::RangeQuery;
use crate::handlers::check_used;
use crate::state::AppState;

/// Metering request: aggregated usage of one category for one bucket.
#[derive(Debug, Deserialize)]
pub struct MeteringRequest {
    /// Billed entity.
    pub category: String,
    /// Any time within the bucket; truncated to the bucket start.
    pub time: DateTime<Utc>,
    /// Used amounts in billing units, keyed by property name.
    pub used: BTreeMap<String, i64>,
    /// Free-text detail stored on every entry.
    #[serde(default)]
    pub detail: String,
}

/// Metering entries with their total.
#[derive(Debug, Serialize)]
pub struct MeteringResponse {
    /// The entries.
    pub entries: Vec<Metering>,
    /// Sum of entry amounts.
    pub total: i64,
}

impl MeteringResponse {
    fn new(entries: Vec<Metering>) -> Result<Self, ApiError> {
        let total = total_amount(&entries)?;
        Ok(Self { entries, total })
    }
}

/// Price a bucket of usage and store one entry per requested name.
///
/// GPU usage keyed `gpu-<product>` is stored per product.
///
/// Re-posting the same bucket overwrites its entries.
pub async fn record_metering(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<MeteringRequest>,
) -> Result<Json<MeteringResponse>, ApiError> {
    if body.category.is_empty() {
        return Err(ApiError::BadRequest("category is required".into()));
    }
    check_used(&state.registry, &body.used)?;
    let time = bucket_start(body.time, DEFAULT_BUCKET_SECONDS);

    let entries: Vec<Metering> =
        Metering::from_named(&body.category, time, &body.used, &state.registry)?
        .into_iter()
        .map(|m| m.with_detail(body.detail.clone()))
        .collect();

    for entry in &entries {
        state.store.put_metering(entry)?;
    }

    let response = MeteringResponse::new(entries)?;
    tracing::info!(
        service = %auth.service_name,
        category = %body.category,
        time = %time,
        total = response.total,
        "Metering recorded"
    );

    Ok(Json(response))
}

/// List metering entries of a category in a time range.
pub async fn list_metering(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<MeteringResponse>, ApiError> {
    query.validate()?;
    let entries = state
        .store
        .list_meterings(&query.category, query.from, query.to)?;
    Ok(Json(MeteringResponse::new(entries)?))
}

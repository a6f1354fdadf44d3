//! Raw usage sample handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use resmeter_core::{AppType, Monitor, PropertyRegistry};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::handlers::used_by_enum;
use crate::state::AppState;

/// Monitor ingestion request.
#[derive(Debug, Deserialize)]
pub struct MonitorRequest {
    /// Sample time (default: now).
    pub time: Option<DateTime<Utc>>,
    /// Billed entity.
    pub category: String,
    /// Application type, e.g. `"APP"`.
    #[serde(rename = "type")]
    pub app_type: String,
    /// Name of the sampled object.
    pub name: String,
    /// Property name.
    pub property: String,
    /// Observed amounts keyed by property name.
    pub used: BTreeMap<String, i64>,
}

/// A sample as returned by the API.
#[derive(Debug, Serialize)]
pub struct MonitorResponse {
    /// Sample time.
    pub time: DateTime<Utc>,
    /// Billed entity.
    pub category: String,
    /// Application type.
    #[serde(rename = "type")]
    pub app_type: String,
    /// Name of the sampled object.
    pub name: String,
    /// Property name.
    pub property: String,
    /// Observed amounts keyed by property name.
    pub used: BTreeMap<String, i64>,
}

impl MonitorResponse {
    fn new(monitor: Monitor, registry: &PropertyRegistry) -> Self {
        Self {
            used: registry.enum_used_to_names(&monitor.used),
            time: monitor.time,
            category: monitor.category,
            app_type: monitor.app_type.to_string(),
            name: monitor.name,
            property: monitor.property,
        }
    }
}

/// Time-range query.
#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    /// Billed entity.
    pub category: String,
    /// Inclusive lower bound.
    pub from: DateTime<Utc>,
    /// Exclusive upper bound.
    pub to: DateTime<Utc>,
}

impl RangeQuery {
    pub(crate) fn validate(&self) -> Result<(), ApiError> {
        if self.category.is_empty() {
            return Err(ApiError::BadRequest("category is required".into()));
        }
        if self.from > self.to {
            return Err(ApiError::BadRequest("from must not be after to".into()));
        }
        Ok(())
    }
}

/// Record a raw usage sample.
pub async fn record_monitor(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<MonitorRequest>,
) -> Result<(StatusCode, Json<MonitorResponse>), ApiError> {
    if body.category.is_empty() {
        return Err(ApiError::BadRequest("category is required".into()));
    }
    let app_type: AppType = body.app_type.parse()?;
    let used = used_by_enum(&state.registry, &body.used)?;

    let monitor = Monitor {
        time: body.time.unwrap_or_else(Utc::now),
        category: body.category,
        app_type,
        name: body.name,
        used,
        property: body.property,
    };
    state.store.put_monitor(&monitor)?;

    tracing::debug!(
        service = %auth.service_name,
        category = %monitor.category,
        name = %monitor.name,
        "Monitor recorded"
    );

    Ok((
        StatusCode::CREATED,
        Json(MonitorResponse::new(monitor, &state.registry)),
    ))
}

/// List samples of a category in a time range.
pub async fn list_monitors(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RangeQuery>,
) -> Result<Json<Vec<MonitorResponse>>, ApiError> {
    query.validate()?;
    let monitors = state
        .store
        .list_monitors(&query.category, query.from, query.to)?;

    Ok(Json(
        monitors
            .into_iter()
            .map(|m| MonitorResponse::new(m, &state.registry))
            .collect(),
    ))
}

//! Quantity normalization.

use std::collections::BTreeMap;

use axum::Json;
use serde::{Deserialize, Serialize};

use resmeter_core::{normalized_units, units, Quantity};

use crate::auth::ServiceAuth;
use crate::error::ApiError;

/// Normalize request: raw quantities by resource kind.
#[derive(Debug, Deserialize)]
pub struct NormalizeRequest {
    /// Quantities such as `"1500m"` or `"256Mi"`, keyed by resource kind.
    pub resources: BTreeMap<String, Quantity>,
}

/// One normalized resource.
#[derive(Debug, Serialize)]
pub struct NormalizedResource {
    /// Whole billing units, rounded up.
    pub units: i64,
    /// GPU product id, for per-product GPU kinds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product: Option<String>,
}

/// Normalize response.
#[derive(Debug, Serialize)]
pub struct NormalizeResponse {
    /// Normalized resources keyed by kind.
    pub resources: BTreeMap<String, NormalizedResource>,
}

/// Convert raw quantities into billing units.
pub async fn normalize(
    _auth: ServiceAuth,
    Json(body): Json<NormalizeRequest>,
) -> Result<Json<NormalizeResponse>, ApiError> {
    let mut resources = BTreeMap::new();
    for (kind, quantity) in &body.resources {
        let units = normalized_units(kind, Some(quantity))?;
        let product = units::is_gpu_resource(kind).then(|| units::gpu_product(kind).to_string());
        resources.insert(kind.clone(), NormalizedResource { units, product });
    }
    Ok(Json(NormalizeResponse { resources }))
}

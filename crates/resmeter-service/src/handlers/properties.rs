//! Property listing.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use resmeter_core::{PriceType, PropertyType};

use crate::state::AppState;

/// A billable property as exposed over the API. Ciphertext is never returned.
#[derive(Debug, Serialize)]
pub struct PropertyResponse {
    /// Property name.
    pub name: String,
    /// Human-facing alias.
    pub alias: String,
    /// Enumeration id.
    #[serde(rename = "enum")]
    pub enum_id: u8,
    /// Aggregation mode.
    pub price_type: PriceType,
    /// Unit price, fixed-point.
    pub unit_price: i64,
    /// Billing unit.
    pub unit: String,
    /// Billing period in seconds.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub unit_period: String,
}

impl From<&PropertyType> for PropertyResponse {
    fn from(p: &PropertyType) -> Self {
        Self {
            name: p.name.clone(),
            alias: p.alias.clone(),
            enum_id: p.enum_id,
            price_type: p.price_type,
            unit_price: p.unit_price,
            unit: p
                .unit
                .map_or_else(|| p.unit_string.clone(), |u| u.to_string()),
            unit_period: p.unit_period.clone(),
        }
    }
}

/// List the active billable properties.
pub async fn list_properties(State(state): State<Arc<AppState>>) -> Json<Vec<PropertyResponse>> {
    Json(state.registry.types().iter().map(PropertyResponse::from).collect())
}

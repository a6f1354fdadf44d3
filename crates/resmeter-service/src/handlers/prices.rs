//! Price list handlers.
//!
//! The price list is the reference table published by the price source. Pricing
//! itself uses the registry, whose unit prices are served by `applied_prices`.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use resmeter_core::{prices_of, Price, PropertyRegistry};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Replace-prices request.
#[derive(Debug, Deserialize)]
pub struct PutPricesRequest {
    /// The new price list.
    pub prices: Vec<Price>,
}

/// Get the current price list.
pub async fn get_prices(State(state): State<Arc<AppState>>) -> Json<Vec<Price>> {
    Json(state.prices.read().await.clone())
}

/// Get the unit prices metering and billing actually apply.
pub async fn applied_prices(State(state): State<Arc<AppState>>) -> Json<Vec<Price>> {
    Json(prices_of(&state.registry))
}

/// Reference entries whose price differs from the applied registry price.
fn diverging<'a>(prices: &'a [Price], registry: &PropertyRegistry) -> Vec<&'a str> {
    prices
        .iter()
        .filter(|p| {
            registry
                .by_name(&p.property)
                .is_some_and(|property| property.unit_price != p.price)
        })
        .map(|p| p.property.as_str())
        .collect()
}

/// Replace the stored price list (admin only).
pub async fn put_prices(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(body): Json<PutPricesRequest>,
) -> Result<Json<Vec<Price>>, ApiError> {
    if body.prices.is_empty() {
        return Err(ApiError::BadRequest("price list must not be empty".into()));
    }
    if let Some(bad) = body
        .prices
        .iter()
        .find(|p| p.property.is_empty() || p.price < 0)
    {
        return Err(ApiError::BadRequest(format!(
            "invalid price entry: {:?} = {}",
            bad.property, bad.price
        )));
    }

    let differing = diverging(&body.prices, &state.registry);
    if !differing.is_empty() {
        tracing::warn!(
            properties = ?differing,
            "Price list differs from applied registry prices"
        );
    }

    state.store.put_prices(&body.prices)?;
    *state.prices.write().await = body.prices.clone();

    tracing::info!(
        admin_id = %admin.admin_id,
        count = body.prices.len(),
        "Price list replaced"
    );

    Ok(Json(body.prices))
}

/// Re-read the price list from the store (admin only).
///
/// On timeout or store failure the current list is kept and an error is returned.
pub async fn refresh_prices(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
) -> Result<Json<Vec<Price>>, ApiError> {
    let prices = state.refresh_prices().await?;
    tracing::info!(admin_id = %admin.admin_id, count = prices.len(), "Price list refreshed");
    Ok(Json(prices))
}

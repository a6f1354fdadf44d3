//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{billing, health, metering, monitors, normalize, prices, properties};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for ingestion endpoints.
/// Collectors report on a fixed schedule and may burst.
const INGEST_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Reporting
/// - `GET /v1/properties` - Active billable properties
/// - `GET /v1/prices` - Reference price list from the price source
/// - `GET /v1/prices/applied` - Unit prices used for pricing
/// - `GET /v1/monitors` - Raw samples of a category in a time range
/// - `GET /v1/metering` - Metering of a category in a time range
/// - `GET /v1/billing` - Ledger of a namespace (newest first)
/// - `GET /v1/billing/:order_id` - One ledger entry
///
/// ## Ingestion (Service API Key auth, rate-limited)
/// - `POST /v1/normalize` - Convert quantities into billing units
/// - `POST /v1/monitors` - Record a raw sample
/// - `POST /v1/metering` - Price a bucket of usage
/// - `POST /v1/billing` - Create a ledger entry
///
/// ## Admin (Admin API Key auth)
/// - `PUT /v1/prices` - Replace the price list
/// - `POST /v1/prices/refresh` - Re-read the price list from the store
/// - `POST /v1/billing/:order_id/settle` - Settle a ledger entry
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    // Build CORS layer
    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let ingest_routes = Router::new()
        .route("/normalize", post(normalize::normalize))
        .route(
            "/monitors",
            post(monitors::record_monitor).get(monitors::list_monitors),
        )
        .route(
            "/metering",
            post(metering::record_metering).get(metering::list_metering),
        )
        .layer(ConcurrencyLimitLayer::new(INGEST_MAX_CONCURRENT_REQUESTS));

    let api_routes = Router::new()
        .route("/properties", get(properties::list_properties))
        .route("/prices", get(prices::get_prices).put(prices::put_prices))
        .route("/prices/applied", get(prices::applied_prices))
        .route("/prices/refresh", post(prices::refresh_prices))
        .route(
            "/billing",
            post(billing::create_billing).get(billing::list_billing),
        )
        .route("/billing/:order_id", get(billing::get_billing))
        .route("/billing/:order_id/settle", post(billing::settle_billing))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS))
        .merge(ingest_routes);

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}

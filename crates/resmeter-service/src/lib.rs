//! Resmeter HTTP API Service.
//!
//! This crate provides the HTTP API for resmeter, including:
//!
//! - Price registry and price list inspection
//! - Quantity normalization
//! - Usage sample and metering ingestion
//! - The billing ledger and settlement
//!
//! # Authentication
//!
//! The service supports two API keys:
//!
//! 1. **Service API key** (`X-API-Key`) - For collectors and billing jobs
//! 2. **Admin API key** (`X-Admin-Key`) - For price management and settlement

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers are async for the router

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use bootstrap::{build_registry, fetch_prices, load_prices, BootstrapError};
pub use config::ServiceConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;

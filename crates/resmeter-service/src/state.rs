//! Application state.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use resmeter_core::{Price, PropertyRegistry};
use resmeter_store::Store;

use crate::bootstrap::{self, BootstrapError};
use crate::config::ServiceConfig;

/// Application state shared across handlers.
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// The price registry, built once at startup.
    pub registry: Arc<PropertyRegistry>,

    /// The current price list.
    pub prices: RwLock<Vec<Price>>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// The registry is built from the configured property types; `prices` is the
    /// list obtained at startup.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig, prices: Vec<Price>) -> Self {
        let registry = bootstrap::build_registry(&config);

        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not set - ingestion endpoints will reject all requests");
        }
        if config.admin_api_key.is_none() {
            tracing::warn!("ADMIN_API_KEY not set - admin endpoints will reject all requests");
        }

        Self {
            store,
            config,
            registry: Arc::new(registry),
            prices: RwLock::new(prices),
        }
    }

    /// The configured price fetch timeout.
    #[must_use]
    pub fn price_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.config.price_fetch_timeout_seconds)
    }

    /// Re-read the price list from the store.
    ///
    /// On failure, or when the store holds no list, the current list is kept.
    pub async fn refresh_prices(&self) -> Result<Vec<Price>, BootstrapError> {
        let prices = bootstrap::fetch_prices(self.store.clone(), self.price_fetch_timeout()).await?;
        if prices.is_empty() {
            tracing::warn!("Stored price list is empty, keeping current prices");
            return Ok(self.prices.read().await.clone());
        }
        *self.prices.write().await = prices.clone();
        Ok(prices)
    }
}

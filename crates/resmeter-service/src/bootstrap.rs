//! Startup loading of the price registry and price list.
//!
//! Both fail closed: any problem yields the built-in defaults, never a partial table.

use std::sync::Arc;
use std::time::Duration;

use resmeter_core::{default_prices, Price, PriceCipher, PropertyRegistry};
use resmeter_store::{Store, StoreError};

use crate::config::ServiceConfig;

/// Errors from fetching the price list.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The store did not answer in time.
    #[error("price fetch timed out after {0:?}")]
    Timeout(Duration),

    /// The store query failed.
    #[error("price store error: {0}")]
    Store(#[from] StoreError),

    /// The blocking fetch task panicked or was cancelled.
    #[error("price fetch task failed: {0}")]
    Task(String),
}

/// Build the property registry from configuration.
///
/// Falls back to the default registry if the key is missing or any price fails to decrypt.
#[must_use]
pub fn build_registry(config: &ServiceConfig) -> PropertyRegistry {
    let cipher = config.price_encryption_key.as_deref().map(PriceCipher::new);
    PropertyRegistry::load(&config.property_types, cipher.as_ref())
}

/// Fetch the current price list, bounded by `timeout`.
pub async fn fetch_prices(
    store: Arc<dyn Store>,
    timeout: Duration,
) -> Result<Vec<Price>, BootstrapError> {
    let task = tokio::task::spawn_blocking(move || store.get_prices());

    match tokio::time::timeout(timeout, task).await {
        Err(_) => Err(BootstrapError::Timeout(timeout)),
        Ok(Err(e)) => Err(BootstrapError::Task(e.to_string())),
        Ok(Ok(prices)) => Ok(prices?),
    }
}

/// Fetch the price list, falling back to the defaults on any failure.
pub async fn load_prices(store: Arc<dyn Store>, timeout: Duration) -> Vec<Price> {
    match fetch_prices(store, timeout).await {
        Ok(prices) if !prices.is_empty() => {
            tracing::info!(count = prices.len(), "Loaded price list");
            prices
        }
        Ok(_) => {
            tracing::warn!("Price list is empty, using default prices");
            default_prices()
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to fetch prices, using default prices");
            default_prices()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, Utc};
    use resmeter_core::{Billing, Metering, MeteringKey, Monitor, OrderId};
    use resmeter_store::RocksStore;

    /// A store whose price query blocks for a fixed time.
    struct SlowStore {
        delay: Duration,
    }

    impl Store for SlowStore {
        fn put_monitor(&self, _: &Monitor) -> resmeter_store::Result<()> {
            unimplemented!()
        }
        fn list_monitors(
            &self,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> resmeter_store::Result<Vec<Monitor>> {
            unimplemented!()
        }
        fn put_metering(&self, _: &Metering) -> resmeter_store::Result<()> {
            unimplemented!()
        }
        fn get_metering(&self, _: &MeteringKey) -> resmeter_store::Result<Option<Metering>> {
            unimplemented!()
        }
        fn list_meterings(
            &self,
            _: &str,
            _: DateTime<Utc>,
            _: DateTime<Utc>,
        ) -> resmeter_store::Result<Vec<Metering>> {
            unimplemented!()
        }
        fn put_billing(&self, _: &Billing) -> resmeter_store::Result<bool> {
            unimplemented!()
        }
        fn get_billing(&self, _: &OrderId) -> resmeter_store::Result<Option<Billing>> {
            unimplemented!()
        }
        fn list_billings(&self, _: &str, _: usize, _: usize) -> resmeter_store::Result<Vec<Billing>> {
            unimplemented!()
        }
        fn settle_billing(&self, _: &OrderId) -> resmeter_store::Result<Billing> {
            unimplemented!()
        }
        fn put_prices(&self, _: &[Price]) -> resmeter_store::Result<()> {
            unimplemented!()
        }
        fn get_prices(&self) -> resmeter_store::Result<Vec<Price>> {
            std::thread::sleep(self.delay);
            Ok(vec![Price::new("cpu", 1, "")])
        }
    }

    #[tokio::test]
    async fn slow_store_times_out() {
        let store: Arc<dyn Store> = Arc::new(SlowStore {
            delay: Duration::from_millis(300),
        });

        let result = fetch_prices(store.clone(), Duration::from_millis(20)).await;
        assert!(matches!(result, Err(BootstrapError::Timeout(_))));

        let prices = load_prices(store, Duration::from_millis(20)).await;
        assert_eq!(prices, default_prices());
    }

    #[tokio::test]
    async fn stored_prices_are_used() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        store.put_prices(&[Price::new("cpu", 70, "")]).unwrap();

        let prices = load_prices(Arc::new(store), Duration::from_secs(5)).await;
        assert_eq!(prices, vec![Price::new("cpu", 70, "")]);
    }

    #[tokio::test]
    async fn empty_store_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();

        let prices = load_prices(Arc::new(store), Duration::from_secs(5)).await;
        assert_eq!(prices, default_prices());
    }

    #[test]
    fn registry_without_key_is_default() {
        let config = ServiceConfig {
            property_types: vec![resmeter_core::PropertyType::new("cpu", 0, 0, "1m")
                .with_encrypted_price("x")],
            ..ServiceConfig::default()
        };
        let registry = build_registry(&config);
        assert_eq!(registry.types(), PropertyRegistry::defaults().types());
    }

    #[test]
    fn registry_with_key_decrypts() {
        let cipher = PriceCipher::new("k");
        let config = ServiceConfig {
            price_encryption_key: Some("k".into()),
            property_types: vec![resmeter_core::PropertyType::new("cpu", 0, 0, "1m")
                .with_encrypted_price(cipher.encrypt_int64(90).unwrap())],
            ..ServiceConfig::default()
        };
        let registry = build_registry(&config);
        assert_eq!(registry.unit_price(0), Some(90));
        assert_eq!(registry.len(), 1);
    }
}

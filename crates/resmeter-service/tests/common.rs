//! Common test utilities for resmeter integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::TestServer;
use tempfile::TempDir;

use resmeter_core::{default_prices, PriceCipher, PropertyType, GPU_PROPERTY};
use resmeter_service::{create_router, AppState, ServiceConfig};
use resmeter_store::{RocksStore, Store};

/// Key material the harness seals its prices with.
pub const PRICE_KEY: &str = "test-price-key";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// The service API key for ingestion requests.
    pub service_api_key: String,
    /// The admin API key for privileged requests.
    pub admin_api_key: String,
}

/// Sealed property types: the defaults plus a generic GPU at 2000.
pub fn sealed_property_types() -> Vec<PropertyType> {
    let cipher = PriceCipher::new(PRICE_KEY);
    [
        ("cpu", 0, 67, "1m"),
        ("memory", 1, 33, "1Mi"),
        ("storage", 2, 2, "1Mi"),
        ("network", 3, 781, "1Mi"),
        (GPU_PROPERTY, 4, 2000, "1m"),
    ]
    .into_iter()
    .map(|(name, id, price, unit)| {
        PropertyType::new(name, id, 0, unit)
            .with_encrypted_price(cipher.encrypt_int64(price).expect("Failed to seal price"))
    })
    .collect()
}

impl TestHarness {
    /// Create a new test harness with a fresh database and sealed prices.
    pub fn new() -> Self {
        Self::with_config(|config| {
            config.price_encryption_key = Some(PRICE_KEY.into());
            config.property_types = sealed_property_types();
        })
    }

    /// Create a harness whose configuration is adjusted by `configure`.
    pub fn with_config(configure: impl FnOnce(&mut ServiceConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");

        let service_api_key = "test-service-key".to_string();
        let admin_api_key = "test-admin-key".to_string();

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            service_api_key: Some(service_api_key.clone()),
            admin_api_key: Some(admin_api_key.clone()),
            ..ServiceConfig::default()
        };
        configure(&mut config);

        let store: Arc<dyn Store> = Arc::new(store);
        let state = AppState::new(store, config, default_prices());
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            _temp_dir: temp_dir,
            service_api_key,
            admin_api_key,
        }
    }
}

impl TestHarness {
    /// Name of the service key header.
    pub fn service_key_name() -> HeaderName {
        HeaderName::from_static("x-api-key")
    }

    /// Value of the service key header.
    pub fn service_key(&self) -> HeaderValue {
        HeaderValue::from_str(&self.service_api_key).expect("Invalid header value")
    }

    /// Name of the admin key header.
    pub fn admin_key_name() -> HeaderName {
        HeaderName::from_static("x-admin-key")
    }

    /// Value of the admin key header.
    pub fn admin_key(&self) -> HeaderValue {
        HeaderValue::from_str(&self.admin_api_key).expect("Invalid header value")
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

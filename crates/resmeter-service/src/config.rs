//! Service configuration.

use std::path::Path;

use resmeter_core::PropertyType;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/resmeter").
    pub data_dir: String,

    /// Service API key for collectors and billing jobs.
    pub service_api_key: Option<String>,

    /// Admin API key for price management and settlement.
    pub admin_api_key: Option<String>,

    /// Key material used to open encrypted unit prices.
    pub price_encryption_key: Option<String>,

    /// Billable properties with encrypted prices.
    pub property_types: Vec<PropertyType>,

    /// Upper bound on the price fetch at startup and refresh, in seconds.
    pub price_fetch_timeout_seconds: u64,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/resmeter".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            price_encryption_key: std::env::var("PRICE_ENCRYPTION_KEY").ok(),
            property_types: load_property_types(),
            price_fetch_timeout_seconds: std::env::var("PRICE_FETCH_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }
}

/// Load encrypted property types from `PROPERTY_TYPES_PATH` or a secrets file.
///
/// Returns an empty list when nothing is found; the registry then falls back
/// to its defaults.
fn load_property_types() -> Vec<PropertyType> {
    let configured = std::env::var("PROPERTY_TYPES_PATH").ok();
    let secret_paths = [
        ".secrets/property_types.json",
        "resmeter/.secrets/property_types.json",
        "../.secrets/property_types.json",
    ];

    for path in configured.iter().map(String::as_str).chain(secret_paths) {
        match load_secrets_file::<Vec<PropertyType>>(path) {
            Ok(types) => {
                tracing::info!(path = %path, count = types.len(), "Loaded property types from file");
                return types;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path, error = %e, "Failed to read property types"),
        }
    }

    tracing::debug!("Property types file not found");
    Vec::new()
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/resmeter".into(),
            service_api_key: None,
            admin_api_key: None,
            price_encryption_key: None,
            property_types: Vec::new(),
            price_fetch_timeout_seconds: 5,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}

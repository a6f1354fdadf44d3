//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Raw usage samples, keyed by `category || time || name || property`.
    pub const MONITOR: &str = "monitor";

    /// Priced buckets, keyed by `category || time || property`.
    pub const METERING: &str = "metering";

    /// Ledger entries, keyed by `order_id` (ULID).
    pub const BILLING: &str = "billing";

    /// Index: ledger entries by namespace, keyed by `namespace || time || order_id`.
    /// Value is empty (index only).
    pub const BILLING_BY_NAMESPACE: &str = "billing_by_namespace";

    /// The current price list under a single key.
    pub const PRICES: &str = "prices";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::MONITOR,
        cf::METERING,
        cf::BILLING,
        cf::BILLING_BY_NAMESPACE,
        cf::PRICES,
    ]
}

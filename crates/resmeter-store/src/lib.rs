//! `RocksDB` storage layer for resmeter.
//!
//! This crate provides persistent storage for usage samples, metering buckets,
//! ledger entries and the price list using `RocksDB` with column families for
//! efficient range scans.
//!
//! # Architecture
//!
//! The storage uses the following column families:
//!
//! - `monitor`: Raw usage samples, keyed by `category || time || name || property`
//! - `metering`: Priced buckets, keyed by `category || time || property`
//! - `billing`: Ledger entries, keyed by `order_id` (ULID)
//! - `billing_by_namespace`: Index for listing ledger entries by namespace
//! - `prices`: The current price list
//!
//! # Example
//!
//! ```no_run
//! use resmeter_store::{RocksStore, Store};
//! use resmeter_core::Billing;
//!
//! let store = RocksStore::open("/tmp/resmeter-db").unwrap();
//!
//! let billing = Billing::recharge("ns-alice", "alice", 1_000_000, chrono::Utc::now());
//! store.put_billing(&billing).unwrap();
//!
//! let settled = store.settle_billing(&billing.order_id()).unwrap();
//! assert!(settled.is_settled());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use resmeter_core::{Billing, Metering, MeteringKey, Monitor, OrderId, Price};

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different implementations
/// (e.g., `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Monitor Operations
    // =========================================================================

    /// Record a raw usage sample. Rewriting the same sample overwrites it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_monitor(&self, monitor: &Monitor) -> Result<()>;

    /// List samples of a category with `from <= time < to`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_monitors(
        &self,
        category: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Monitor>>;

    // =========================================================================
    // Metering Operations
    // =========================================================================

    /// Insert or overwrite a metering bucket by `(category, property, time)`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_metering(&self, metering: &Metering) -> Result<()>;

    /// Get a metering bucket by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_metering(&self, key: &MeteringKey) -> Result<Option<Metering>>;

    /// List buckets of a category with `from <= time < to`, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_meterings(
        &self,
        category: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Metering>>;

    // =========================================================================
    // Billing Operations
    // =========================================================================

    /// Insert a ledger entry if its order ID is new.
    ///
    /// Returns `false` and leaves the stored entry untouched if the order ID exists.
    /// This also maintains the namespace index.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_billing(&self, billing: &Billing) -> Result<bool>;

    /// Get a ledger entry by order ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_billing(&self, order_id: &OrderId) -> Result<Option<Billing>>;

    /// List ledger entries for a namespace, ordered by time (newest first).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_billings(&self, namespace: &str, limit: usize, offset: usize) -> Result<Vec<Billing>>;

    /// Mark a ledger entry settled and return it. Settled entries are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the entry doesn't exist.
    fn settle_billing(&self, order_id: &OrderId) -> Result<Billing>;

    // =========================================================================
    // Price Operations
    // =========================================================================

    /// Replace the current price list.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_prices(&self, prices: &[Price]) -> Result<()>;

    /// Get the current price list. Empty if none was ever stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_prices(&self) -> Result<Vec<Price>>;
}

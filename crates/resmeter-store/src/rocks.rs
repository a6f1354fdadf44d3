//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};

use resmeter_core::{Billing, Metering, MeteringKey, Monitor, OrderId, Price};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf};
use crate::Store;

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes read-modify-write on the ledger.
    ledger: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            ledger: Mutex::new(()),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn lock_ledger(&self) -> Result<MutexGuard<'_, ()>> {
        self.ledger
            .lock()
            .map_err(|_| StoreError::Database("ledger lock poisoned".into()))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    /// Scan a category's records with `from <= time < to`.
    fn scan_time_range<T: serde::de::DeserializeOwned>(
        &self,
        cf_name: &str,
        category: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let prefix = keys::category_prefix(category)?;
        let start = keys::category_time_key(category, from)?;
        let end = keys::time_bytes(to);

        let mut out = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(&start, Direction::Forward))
        {
            let (key, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }
            let past_end = key
                .get(prefix.len()..prefix.len() + 8)
                .map_or(true, |time| time >= end.as_slice());
            if past_end {
                break;
            }

            out.push(Self::deserialize(&value)?);
        }
        Ok(out)
    }
}

impl Store for RocksStore {
    // =========================================================================
    // Monitor Operations
    // =========================================================================

    fn put_monitor(&self, monitor: &Monitor) -> Result<()> {
        let cf = self.cf(cf::MONITOR)?;
        let key = keys::monitor_key(monitor)?;
        let value = Self::serialize(monitor)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn list_monitors(
        &self,
        category: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Monitor>> {
        self.scan_time_range(cf::MONITOR, category, from, to)
    }

    // =========================================================================
    // Metering Operations
    // =========================================================================

    fn put_metering(&self, metering: &Metering) -> Result<()> {
        let cf = self.cf(cf::METERING)?;
        let key = keys::metering_entry_key(metering)?;
        let value = Self::serialize(metering)?;

        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        tracing::debug!(
            category = %metering.category,
            property = %metering.property,
            time = %metering.time,
            amount = metering.amount,
            "Stored metering"
        );
        Ok(())
    }

    fn get_metering(&self, key: &MeteringKey) -> Result<Option<Metering>> {
        let key = keys::metering_key(&key.category, &key.property, key.time)?;
        self.get(cf::METERING, &key)
    }

    fn list_meterings(
        &self,
        category: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Metering>> {
        self.scan_time_range(cf::METERING, category, from, to)
    }

    // =========================================================================
    // Billing Operations
    // =========================================================================

    fn put_billing(&self, billing: &Billing) -> Result<bool> {
        let cf_billing = self.cf(cf::BILLING)?;
        let cf_by_namespace = self.cf(cf::BILLING_BY_NAMESPACE)?;

        let key = keys::billing_key(&billing.order_id());
        let index_key = keys::namespace_billing_key(
            billing.namespace(),
            billing.time(),
            &billing.order_id(),
        )?;
        let value = Self::serialize(billing)?;

        let _guard = self.lock_ledger()?;

        let exists = self
            .db
            .get_cf(&cf_billing, &key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .is_some();
        if exists {
            tracing::debug!(order_id = %billing.order_id(), "Billing already recorded");
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(&cf_billing, &key, &value);
        batch.put_cf(&cf_by_namespace, &index_key, []); // Index entry (empty value)

        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(true)
    }

    fn get_billing(&self, order_id: &OrderId) -> Result<Option<Billing>> {
        self.get(cf::BILLING, &keys::billing_key(order_id))
    }

    fn list_billings(&self, namespace: &str, limit: usize, offset: usize) -> Result<Vec<Billing>> {
        let cf_by_namespace = self.cf(cf::BILLING_BY_NAMESPACE)?;
        let prefix = keys::category_prefix(namespace)?;

        let iter = self.db.iterator_cf(
            &cf_by_namespace,
            IteratorMode::From(&prefix, Direction::Forward),
        );

        // The index is ordered by entry time, oldest first.
        let mut all_keys: Vec<Box<[u8]>> = Vec::new();
        for item in iter {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;

            if !key.starts_with(&prefix) {
                break;
            }

            all_keys.push(key);
        }

        let mut billings = Vec::new();
        for key in all_keys.iter().rev().skip(offset).take(limit) {
            let order_id = keys::extract_order_id_from_namespace_key(key)?;
            if let Some(billing) = self.get_billing(&order_id)? {
                billings.push(billing);
            }
        }

        Ok(billings)
    }

    fn settle_billing(&self, order_id: &OrderId) -> Result<Billing> {
        let cf = self.cf(cf::BILLING)?;
        let key = keys::billing_key(order_id);

        let _guard = self.lock_ledger()?;

        let mut billing: Billing =
            self.get(cf::BILLING, &key)?.ok_or_else(|| StoreError::NotFound {
                entity: "billing",
                id: order_id.to_string(),
            })?;

        if billing.settle() {
            let value = Self::serialize(&billing)?;
            self.db
                .put_cf(&cf, &key, value)
                .map_err(|e| StoreError::Database(e.to_string()))?;
            tracing::info!(order_id = %order_id, amount = billing.amount(), "Billing settled");
        }

        Ok(billing)
    }

    // =========================================================================
    // Price Operations
    // =========================================================================

    fn put_prices(&self, prices: &[Price]) -> Result<()> {
        let cf = self.cf(cf::PRICES)?;
        let value = Self::serialize(&prices)?;

        self.db
            .put_cf(&cf, keys::CURRENT_PRICES, value)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(())
    }

    fn get_prices(&self) -> Result<Vec<Price>> {
        Ok(self
            .get(cf::PRICES, keys::CURRENT_PRICES)?
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use resmeter_core::{
        AppCost, AppType, BillingStatus, EnumUsedMap, Payment, PropertyRegistry, Transfer,
    };
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn metering(category: &str, property: &str, time: i64, amount: i64) -> Metering {
        Metering {
            category: category.into(),
            property: property.into(),
            time: at(time),
            value: amount,
            amount,
            detail: String::new(),
        }
    }

    #[test]
    fn monitor_range_scan() {
        let (store, _dir) = create_test_store();
        for (name, time) in [("web", 0), ("web", 60), ("db", 60), ("web", 3600)] {
            let monitor = Monitor {
                time: at(time),
                category: "ns-a".into(),
                app_type: AppType::App,
                name: name.into(),
                used: EnumUsedMap::from([(0, 100)]),
                property: "cpu".into(),
            };
            store.put_monitor(&monitor).unwrap();
        }

        let first_hour = store.list_monitors("ns-a", at(0), at(3600)).unwrap();
        assert_eq!(first_hour.len(), 3);
        assert_eq!(first_hour[0].time, at(0));

        assert!(store.list_monitors("ns-b", at(0), at(7200)).unwrap().is_empty());
    }

    #[test]
    fn metering_overwrites_by_key() {
        let (store, _dir) = create_test_store();
        store.put_metering(&metering("ns-a", "cpu", 3600, 10)).unwrap();
        store.put_metering(&metering("ns-a", "cpu", 3600, 20)).unwrap();
        store.put_metering(&metering("ns-a", "memory", 3600, 5)).unwrap();

        let key = metering("ns-a", "cpu", 3600, 0).key();
        assert_eq!(store.get_metering(&key).unwrap().unwrap().amount, 20);

        let all = store.list_meterings("ns-a", at(0), at(7200)).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn metering_range_excludes_end_and_other_categories() {
        let (store, _dir) = create_test_store();
        store.put_metering(&metering("ns-a", "cpu", 0, 1)).unwrap();
        store.put_metering(&metering("ns-a", "cpu", 3600, 2)).unwrap();
        store.put_metering(&metering("ns-ab", "cpu", 0, 3)).unwrap();

        let hour = store.list_meterings("ns-a", at(0), at(3600)).unwrap();
        assert_eq!(hour.len(), 1);
        assert_eq!(hour[0].amount, 1);
    }

    #[test]
    fn billing_insert_is_idempotent() {
        let (store, _dir) = create_test_store();
        let registry = PropertyRegistry::defaults();
        let cost = AppCost::price("web", EnumUsedMap::from([(0, 1000)]), &registry).unwrap();
        let billing = Billing::consumption(
            "ns-a",
            "alice",
            Some(AppType::App),
            vec![cost],
            Payment::default(),
            at(3600),
        )
        .unwrap();

        assert!(store.put_billing(&billing).unwrap());
        store.settle_billing(&billing.order_id()).unwrap();

        // A retried insert must not revert settlement.
        assert!(!store.put_billing(&billing).unwrap());
        let stored = store.get_billing(&billing.order_id()).unwrap().unwrap();
        assert_eq!(stored.status(), BillingStatus::Settled);
        assert_eq!(stored.amount(), 67_000);
    }

    #[test]
    fn settle_is_idempotent_and_missing_is_not_found() {
        let (store, _dir) = create_test_store();
        let billing = Billing::recharge("ns-a", "alice", 500, at(0));
        store.put_billing(&billing).unwrap();

        let once = store.settle_billing(&billing.order_id()).unwrap();
        let twice = store.settle_billing(&billing.order_id()).unwrap();
        assert!(once.is_settled());
        assert_eq!(once, twice);

        let result = store.settle_billing(&OrderId::generate());
        assert!(matches!(result, Err(StoreError::NotFound { entity: "billing", .. })));
    }

    #[test]
    fn list_billings_newest_first() {
        let (store, _dir) = create_test_store();

        let first = Billing::recharge("ns-a", "alice", 1, at(0));
        store.put_billing(&first).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2)); // Ensure different ULIDs

        let second = Billing::transfer(
            "ns-a",
            "alice",
            Transfer {
                from: "alice".into(),
                to: "bob".into(),
                amount: 2,
            },
            at(0),
        );
        store.put_billing(&second).unwrap();
        store
            .put_billing(&Billing::recharge("ns-b", "bob", 3, at(0)))
            .unwrap();

        let all = store.list_billings("ns-a", 10, 0).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].order_id(), second.order_id());
        assert_eq!(all[1].order_id(), first.order_id());

        let page2 = store.list_billings("ns-a", 1, 1).unwrap();
        assert_eq!(page2.len(), 1);
        assert_eq!(page2[0].amount(), 1);
    }

    #[test]
    fn list_billings_orders_by_entry_time() {
        let (store, _dir) = create_test_store();

        let later = Billing::recharge("ns-a", "alice", 2, at(7200));
        let earlier = Billing::recharge("ns-a", "alice", 1, at(3600));
        store.put_billing(&later).unwrap();
        store.put_billing(&earlier).unwrap();

        let all = store.list_billings("ns-a", 10, 0).unwrap();
        assert_eq!(all[0].order_id(), later.order_id());
        assert_eq!(all[1].order_id(), earlier.order_id());
    }

    #[test]
    fn prices_replace_whole_list() {
        let (store, _dir) = create_test_store();
        assert!(store.get_prices().unwrap().is_empty());

        store.put_prices(&resmeter_core::default_prices()).unwrap();
        assert_eq!(store.get_prices().unwrap().len(), 3);

        store.put_prices(&[Price::new("cpu", 70, "")]).unwrap();
        let prices = store.get_prices().unwrap();
        assert_eq!(prices, vec![Price::new("cpu", 70, "")]);
    }
}

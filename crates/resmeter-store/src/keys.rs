//! Key encoding utilities for `RocksDB`.
//!
//! String segments are NUL-terminated, timestamps are 8-byte big-endian
//! milliseconds with the sign bit flipped so that byte order matches time order.

use chrono::{DateTime, Utc};
use resmeter_core::{Metering, Monitor, OrderId};

use crate::error::{Result, StoreError};

/// Key of the current price list in the prices column family.
pub const CURRENT_PRICES: &[u8] = b"current";

const SEP: u8 = 0;

/// Encode a timestamp as order-preserving bytes.
#[must_use]
pub fn time_bytes(time: DateTime<Utc>) -> [u8; 8] {
    #[allow(clippy::cast_sign_loss)]
    let bits = (time.timestamp_millis() as u64) ^ (1 << 63);
    bits.to_be_bytes()
}

fn push_segment(key: &mut Vec<u8>, segment: &str) -> Result<()> {
    if segment.as_bytes().contains(&SEP) {
        return Err(StoreError::InvalidRecord(format!(
            "key segment contains NUL: {segment:?}"
        )));
    }
    key.extend_from_slice(segment.as_bytes());
    key.push(SEP);
    Ok(())
}

/// Prefix for iterating all records of a category.
///
/// # Errors
///
/// Returns `StoreError::InvalidRecord` if the category contains a NUL byte.
pub fn category_prefix(category: &str) -> Result<Vec<u8>> {
    let mut key = Vec::with_capacity(category.len() + 1);
    push_segment(&mut key, category)?;
    Ok(key)
}

/// Lower bound of a time range within a category.
///
/// # Errors
///
/// Returns `StoreError::InvalidRecord` if the category contains a NUL byte.
pub fn category_time_key(category: &str, time: DateTime<Utc>) -> Result<Vec<u8>> {
    let mut key = category_prefix(category)?;
    key.extend_from_slice(&time_bytes(time));
    Ok(key)
}

/// Create a monitor key.
///
/// Format: `category \0 time(8) name \0 property \0`
///
/// # Errors
///
/// Returns `StoreError::InvalidRecord` if a segment contains a NUL byte.
pub fn monitor_key(monitor: &Monitor) -> Result<Vec<u8>> {
    let mut key = category_time_key(&monitor.category, monitor.time)?;
    push_segment(&mut key, &monitor.name)?;
    push_segment(&mut key, &monitor.property)?;
    Ok(key)
}

/// Create a metering key.
///
/// Format: `category \0 time(8) property \0`
///
/// # Errors
///
/// Returns `StoreError::InvalidRecord` if a segment contains a NUL byte.
pub fn metering_key(category: &str, property: &str, time: DateTime<Utc>) -> Result<Vec<u8>> {
    let mut key = category_time_key(category, time)?;
    push_segment(&mut key, property)?;
    Ok(key)
}

/// Create the key of a metering entry.
///
/// # Errors
///
/// Returns `StoreError::InvalidRecord` if a segment contains a NUL byte.
pub fn metering_entry_key(metering: &Metering) -> Result<Vec<u8>> {
    metering_key(&metering.category, &metering.property, metering.time)
}

/// Create a billing key from an order ID.
#[must_use]
pub fn billing_key(order_id: &OrderId) -> Vec<u8> {
    order_id.to_bytes().to_vec()
}

/// Create a namespace-billing index key.
///
/// Format: `namespace \0 time(8) order_id (16 bytes)`
///
/// Entries for a namespace sort by entry time, then by order ID.
///
/// # Errors
///
/// Returns `StoreError::InvalidRecord` if the namespace contains a NUL byte.
pub fn namespace_billing_key(
    namespace: &str,
    time: DateTime<Utc>,
    order_id: &OrderId,
) -> Result<Vec<u8>> {
    let mut key = category_time_key(namespace, time)?;
    key.extend_from_slice(&order_id.to_bytes());
    Ok(key)
}

/// Extract the order ID from a namespace-billing index key.
///
/// # Errors
///
/// Returns `StoreError::Database` if the key is shorter than an order ID.
pub fn extract_order_id_from_namespace_key(key: &[u8]) -> Result<OrderId> {
    let start = key
        .len()
        .checked_sub(16)
        .ok_or_else(|| StoreError::Database("truncated billing index key".into()))?;
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&key[start..]);
    Ok(OrderId::from_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    #[test]
    fn time_bytes_preserve_order() {
        let times = [-5_000, -1, 0, 1, 3_600_000, 1_700_000_000_000];
        for pair in times.windows(2) {
            assert!(time_bytes(at(pair[0])) < time_bytes(at(pair[1])));
        }
    }

    #[test]
    fn metering_key_format() {
        let key = metering_key("ns-a", "cpu", at(0)).unwrap();
        assert_eq!(&key[..5], b"ns-a\0");
        assert_eq!(&key[5..13], &time_bytes(at(0)));
        assert_eq!(&key[13..], b"cpu\0");
    }

    #[test]
    fn categories_do_not_share_prefixes() {
        let a = category_prefix("ns").unwrap();
        let b = metering_key("ns-b", "cpu", at(0)).unwrap();
        assert!(!b.starts_with(&a));
    }

    #[test]
    fn nul_in_segment_is_rejected() {
        assert!(matches!(
            metering_key("ns\0x", "cpu", at(0)),
            Err(StoreError::InvalidRecord(_))
        ));
    }

    #[test]
    fn extract_order_id_roundtrip() {
        let order_id = OrderId::generate();
        let key = namespace_billing_key("ns-alice", at(0), &order_id).unwrap();
        assert_eq!(key.len(), "ns-alice".len() + 1 + 8 + 16);
        assert_eq!(extract_order_id_from_namespace_key(&key).unwrap(), order_id);
        assert!(extract_order_id_from_namespace_key(&[1, 2]).is_err());
    }
}

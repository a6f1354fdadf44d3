//! Priced, time-bucketed usage.
//!
//! Inputs are already expressed in billing units and already aggregated
//! according to each property's [`PriceType`](crate::property::PriceType).
//! This module only multiplies by price.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::monitor::EnumUsedMap;
use crate::registry::PropertyRegistry;

/// Default bucket width in seconds.
pub const DEFAULT_BUCKET_SECONDS: i64 = 3600;

/// One priced entry for a category, property and bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metering {
    /// Billed entity.
    pub category: String,

    /// Property name.
    pub property: String,

    /// Bucket start.
    pub time: DateTime<Utc>,

    /// Used amount in billing units.
    pub value: i64,

    /// Monetary amount, fixed-point.
    pub amount: i64,

    /// Free-text detail.
    #[serde(default)]
    pub detail: String,
}

/// Unique key of a metering entry. Writing the same key twice overwrites.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MeteringKey {
    /// Billed entity.
    pub category: String,
    /// Property name.
    pub property: String,
    /// Bucket start.
    pub time: DateTime<Utc>,
}

/// `used * unit_price`.
///
/// # Errors
///
/// Returns `BillingError::Overflow` if the product does not fit in an `i64`.
pub fn amount(used: i64, unit_price: i64) -> Result<i64> {
    used.checked_mul(unit_price)
        .ok_or_else(|| BillingError::Overflow(format!("{used} * {unit_price}")))
}

/// Truncate a timestamp to the start of its bucket.
///
/// A non-positive period leaves the time unchanged.
#[must_use]
pub fn bucket_start(time: DateTime<Utc>, period_seconds: i64) -> DateTime<Utc> {
    if period_seconds <= 0 {
        return time;
    }
    let secs = time.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(period_seconds), 0).unwrap_or(time)
}

impl Metering {
    /// The storage key of this entry.
    #[must_use]
    pub fn key(&self) -> MeteringKey {
        MeteringKey {
            category: self.category.clone(),
            property: self.property.clone(),
            time: self.time,
        }
    }

    /// Price a single used amount against a property.
    ///
    /// # Errors
    ///
    /// - `BillingError::UnknownProperty` if the id is not in the registry.
    /// - `BillingError::Overflow` if the amount overflows.
    pub fn price(
        category: &str,
        time: DateTime<Utc>,
        enum_id: u8,
        used: i64,
        registry: &PropertyRegistry,
    ) -> Result<Self> {
        let property = registry
            .by_enum(enum_id)
            .ok_or_else(|| BillingError::UnknownProperty(enum_id.to_string()))?;
        Ok(Self {
            category: category.to_string(),
            property: property.name.clone(),
            time,
            value: used,
            amount: amount(used, property.unit_price)?,
            detail: String::new(),
        })
    }

    /// Price every entry of a usage map.
    ///
    /// Unknown ids are rejected rather than dropped so that no usage goes unbilled.
    ///
    /// # Errors
    ///
    /// Same as [`Self::price`].
    pub fn from_used(
        category: &str,
        time: DateTime<Utc>,
        used: &EnumUsedMap,
        registry: &PropertyRegistry,
    ) -> Result<Vec<Self>> {
        used.iter()
            .map(|(id, value)| Self::price(category, time, *id, *value, registry))
            .collect()
    }

    /// Price a name-keyed usage map.
    ///
    /// Each entry keeps the requested name, so `gpu-<product>` usage stays apart
    /// from other products while being priced at the resolved GPU property.
    ///
    /// # Errors
    ///
    /// - `BillingError::UnknownProperty` if a name does not resolve.
    /// - `BillingError::Overflow` if an amount overflows.
    pub fn from_named(
        category: &str,
        time: DateTime<Utc>,
        used: &BTreeMap<String, i64>,
        registry: &PropertyRegistry,
    ) -> Result<Vec<Self>> {
        used.iter()
            .map(|(name, value)| {
                let resolved = registry
                    .resolve(name)
                    .ok_or_else(|| BillingError::UnknownProperty(name.clone()))?;
                Ok(Self {
                    category: category.to_string(),
                    property: name.clone(),
                    time,
                    value: *value,
                    amount: amount(*value, resolved.property.unit_price)?,
                    detail: String::new(),
                })
            })
            .collect()
    }

    /// Set the detail text.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = detail.into();
        self
    }
}

/// Sum of metering amounts.
///
/// # Errors
///
/// Returns `BillingError::Overflow` if the sum overflows.
pub fn total_amount<'a>(entries: impl IntoIterator<Item = &'a Metering>) -> Result<i64> {
    entries.into_iter().try_fold(0i64, |acc, m| {
        acc.checked_add(m.amount)
            .ok_or_else(|| BillingError::Overflow("metering total".into()))
    })
}

//! Price list entries as served by the price source.

use serde::{Deserialize, Serialize};

use crate::registry::PropertyRegistry;
use crate::units::{RESOURCE_CPU, RESOURCE_MEMORY, RESOURCE_STORAGE};

/// One entry of the current price list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Property name.
    pub property: String,

    /// Unit price, fixed-point.
    pub price: i64,

    /// Free-text description.
    #[serde(default)]
    pub detail: String,
}

impl Price {
    /// Create a price entry.
    #[must_use]
    pub fn new(property: impl Into<String>, price: i64, detail: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            price,
            detail: detail.into(),
        }
    }
}

/// The built-in price list.
#[must_use]
pub fn default_prices() -> Vec<Price> {
    vec![
        Price::new(RESOURCE_CPU, 67, "cpu price per millicore"),
        Price::new(RESOURCE_MEMORY, 33, "memory price per MiB"),
        Price::new(RESOURCE_STORAGE, 2, "storage price per MiB"),
    ]
}

/// Project the prices of a registry into a price list.
#[must_use]
pub fn prices_of(registry: &PropertyRegistry) -> Vec<Price> {
    registry
        .types()
        .iter()
        .map(|p| Price::new(p.name.clone(), p.unit_price, p.alias.clone()))
        .collect()
}

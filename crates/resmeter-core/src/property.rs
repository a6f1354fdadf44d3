//! Billable property definitions.
//!
//! A property is one billable resource kind. Its enumeration id is the compact
//! key used in stored usage maps, so it must stay stable once assigned.
//!
//! `amount = used (average or sum over the period, in billing units) * unit_price`
//!
//! Unit prices are fixed-point: `1_000_000` is one currency unit.

use serde::{Deserialize, Serialize};

use crate::quantity::Quantity;
use crate::units::{RESOURCE_CPU, RESOURCE_MEMORY, RESOURCE_NETWORK, RESOURCE_STORAGE};

/// How usage over a billing period is aggregated before pricing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PriceType {
    /// Average over the period.
    #[default]
    #[serde(rename = "AVG")]
    Avg,
    /// Cumulative total over the period.
    #[serde(rename = "SUM")]
    Sum,
}

/// One billable resource kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyType {
    /// Stable property name, e.g. `cpu`.
    pub name: String,

    /// Human-facing alias.
    #[serde(default)]
    pub alias: String,

    /// Compact enumeration id used as the key of stored usage maps.
    #[serde(rename = "enum")]
    pub enum_id: u8,

    /// Aggregation mode of the usage this property prices.
    #[serde(default)]
    pub price_type: PriceType,

    /// Price per billing unit, fixed-point.
    #[serde(default)]
    pub unit_price: i64,

    /// Sealed form of `unit_price` as delivered by configuration.
    #[serde(default)]
    pub encrypt_unit_price: String,

    /// Parsed billing unit; filled from `unit_string` when the registry is built.
    #[serde(skip)]
    pub unit: Option<Quantity>,

    /// Billing unit as a quantity string, e.g. `1m` or `1Mi`.
    #[serde(rename = "unit", default)]
    pub unit_string: String,

    /// Billing period in seconds.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit_period: String,
}

impl PropertyType {
    /// Create a property with a plaintext price.
    #[must_use]
    pub fn new(name: impl Into<String>, enum_id: u8, unit_price: i64, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: String::new(),
            enum_id,
            price_type: PriceType::Avg,
            unit_price,
            encrypt_unit_price: String::new(),
            unit: None,
            unit_string: unit.into(),
            unit_period: String::new(),
        }
    }

    /// Set the aggregation mode.
    #[must_use]
    pub fn with_price_type(mut self, price_type: PriceType) -> Self {
        self.price_type = price_type;
        self
    }

    /// Set the sealed price.
    #[must_use]
    pub fn with_encrypted_price(mut self, sealed: impl Into<String>) -> Self {
        self.encrypt_unit_price = sealed.into();
        self
    }
}

/// The built-in property list used when the configured prices cannot be trusted.
///
/// | property | enum | price | unit |
/// | -------- | ---- | ----- | ---- |
/// | cpu      | 0    | 67    | 1m   |
/// | memory   | 1    | 33    | 1Mi  |
/// | storage  | 2    | 2     | 1Mi  |
/// | network  | 3    | 781   | 1Mi  |
#[must_use]
pub fn default_property_types() -> Vec<PropertyType> {
    vec![
        PropertyType::new(RESOURCE_CPU, 0, 67, "1m"),
        PropertyType::new(RESOURCE_MEMORY, 1, 33, "1Mi"),
        PropertyType::new(RESOURCE_STORAGE, 2, 2, "1Mi"),
        PropertyType::new(RESOURCE_NETWORK, 3, 781, "1Mi"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_names() {
        let property = PropertyType::new("cpu", 0, 67, "1m").with_price_type(PriceType::Sum);
        let json = serde_json::to_value(&property).unwrap();
        assert_eq!(json["enum"], 0);
        assert_eq!(json["unit"], "1m");
        assert_eq!(json["price_type"], "SUM");
        assert!(json.get("unit_period").is_none());
    }

    #[test]
    fn price_type_defaults_to_avg() {
        let property: PropertyType =
            serde_json::from_str(r#"{"name":"gpu","enum":4,"encrypt_unit_price":"x","unit":"1m"}"#)
                .unwrap();
        assert_eq!(property.price_type, PriceType::Avg);
        assert_eq!(property.unit_price, 0);
        assert!(property.unit.is_none());
    }
}

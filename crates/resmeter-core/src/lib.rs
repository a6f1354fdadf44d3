//! Core types and utilities for resmeter.
//!
//! This crate turns raw resource usage into money:
//!
//! - **Quantities**: `Quantity`, parsed from strings such as `1500m` or `256Mi`
//! - **Normalization**: `normalized_units`, quantity to whole billing units
//! - **Prices**: `PropertyType`, `PropertyRegistry`, `PriceCipher`, `Price`
//! - **Usage**: `Monitor`, `Metering`, `EnumUsedMap`
//! - **Ledger**: `Billing`, `AppCost`, `Payment`, `Transfer`
//!
//! # Money
//!
//! **1 currency unit = 1,000,000**
//!
//! - Unit prices and amounts are `i64` fixed-point values
//! - `amount = used * unit_price`, with `used` already in billing units
//! - No floating point anywhere on the pricing path

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod billing;
pub mod crypto;
pub mod error;
pub mod ids;
pub mod metering;
pub mod monitor;
pub mod price;
pub mod property;
pub mod quantity;
pub mod registry;
pub mod units;

pub use billing::{
    AppCost, Billing, BillingKind, BillingRecord, BillingStatus, BillingType, Payment, Transfer,
};
pub use crypto::{CryptoError, PriceCipher};
pub use error::{BillingError, Result};
pub use ids::{IdError, OrderId};
pub use metering::{bucket_start, Metering, MeteringKey, DEFAULT_BUCKET_SECONDS};
pub use monitor::{AppType, EnumUsedMap, Monitor};
pub use price::{default_prices, prices_of, Price};
pub use property::{default_property_types, PriceType, PropertyType};
pub use quantity::{Format, Quantity, QuantityError};
pub use registry::{PropertyRegistry, Resolved, GPU_PROPERTY};
pub use units::{normalized_units, price_unit, QuantityDetail};

//! API handlers.

use std::collections::BTreeMap;

use resmeter_core::{EnumUsedMap, PropertyRegistry};

use crate::error::ApiError;

pub mod billing;
pub mod health;
pub mod metering;
pub mod monitors;
pub mod normalize;
pub mod prices;
pub mod properties;

/// Default page size for list endpoints.
const DEFAULT_LIMIT: usize = 50;

/// Largest page a client may request.
const MAX_LIMIT: usize = 500;

/// Clamp a requested page size.
fn page_limit(limit: Option<usize>) -> usize {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

/// Check a name-keyed usage map before pricing.
///
/// Unlike reporting translation this is strict: usage for a property that
/// cannot be priced is rejected instead of silently dropped, and amounts
/// must not be negative.
fn check_used(registry: &PropertyRegistry, used: &BTreeMap<String, i64>) -> Result<(), ApiError> {
    for (name, amount) in used {
        if registry.resolve(name).is_none() {
            return Err(ApiError::BadRequest(format!("unknown property: {name}")));
        }
        if *amount < 0 {
            return Err(ApiError::BadRequest(format!(
                "negative usage for {name}: {amount}"
            )));
        }
    }
    Ok(())
}

/// Convert a checked name-keyed usage map into enumeration ids.
fn used_by_enum(
    registry: &PropertyRegistry,
    used: &BTreeMap<String, i64>,
) -> Result<EnumUsedMap, ApiError> {
    check_used(registry, used)?;
    Ok(registry.names_to_enum_used(used)?)
}

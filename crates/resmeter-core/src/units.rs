//! Resource kinds and normalization into billing units.
//!
//! | resource | billing unit |
//! | -------- | ------------ |
//! | cpu      | 1m (millicore) |
//! | gpu      | 1m |
//! | memory   | 1Mi |
//! | storage  | 1Mi |
//! | network  | 1Mi |
//! | infra-cpu | 1m |
//! | infra-memory, infra-disk | 1Mi |

use std::collections::HashMap;

use crate::error::{BillingError, Result};
use crate::quantity::{Format, Quantity, GI, MI};

/// CPU resource name.
pub const RESOURCE_CPU: &str = "cpu";

/// Memory resource name.
pub const RESOURCE_MEMORY: &str = "memory";

/// Storage resource name.
pub const RESOURCE_STORAGE: &str = "storage";

/// Network resource name.
pub const RESOURCE_NETWORK: &str = "network";

/// Extended resource name for NVIDIA GPUs.
pub const RESOURCE_GPU: &str = "nvidia.com/gpu";

/// Infrastructure CPU property.
pub const PROPERTY_INFRA_CPU: &str = "infra-cpu";

/// Infrastructure memory property.
pub const PROPERTY_INFRA_MEMORY: &str = "infra-memory";

/// Infrastructure disk property.
pub const PROPERTY_INFRA_DISK: &str = "infra-disk";

/// Prefix of per-product GPU resources, e.g. `gpu-tesla-v100`.
pub const GPU_RESOURCE_PREFIX: &str = "gpu-";

const CPU_UNIT: Quantity = Quantity::from_milli(1, Format::DecimalSI);
const MI_UNIT: Quantity = Quantity::from_milli(MI * 1000, Format::BinarySI);

/// Cores per instance flavor.
const INFRA_CPU: [(&str, i64); 6] = [
    ("t2.medium", 2),
    ("t2.large", 2),
    ("t2.xlarge", 4),
    ("ecs.c7.large", 2),
    ("ecs.g7.large", 2),
    ("ecs.g7.xlarge", 4),
];

/// GiB of memory per instance flavor.
const INFRA_MEMORY: [(&str, i64); 6] = [
    ("t2.medium", 4),
    ("t2.large", 8),
    ("t2.xlarge", 16),
    ("ecs.c7.large", 4),
    ("ecs.g7.large", 8),
    ("ecs.g7.xlarge", 16),
];

/// Build the resource name for a GPU product.
#[must_use]
pub fn gpu_resource(product: &str) -> String {
    format!("{GPU_RESOURCE_PREFIX}{product}")
}

/// Whether a resource name denotes a per-product GPU.
#[must_use]
pub fn is_gpu_resource(name: &str) -> bool {
    name.starts_with(GPU_RESOURCE_PREFIX)
}

/// The product id of a per-product GPU resource, or the name unchanged.
#[must_use]
pub fn gpu_product(name: &str) -> &str {
    name.strip_prefix(GPU_RESOURCE_PREFIX).unwrap_or(name)
}

/// The billing unit (divisor) for a resource kind.
#[must_use]
pub fn price_unit(kind: &str) -> Option<Quantity> {
    match kind {
        RESOURCE_CPU | RESOURCE_GPU | PROPERTY_INFRA_CPU => Some(CPU_UNIT),
        RESOURCE_MEMORY
        | RESOURCE_STORAGE
        | RESOURCE_NETWORK
        | PROPERTY_INFRA_MEMORY
        | PROPERTY_INFRA_DISK => Some(MI_UNIT),
        _ if is_gpu_resource(kind) => Some(CPU_UNIT),
        _ => None,
    }
}

/// Convert a quantity into whole billing units for a resource kind.
///
/// Fractions of a unit are rounded up. A missing or zero quantity is zero units.
///
/// # Errors
///
/// Returns `BillingError::UnknownResource` if the kind has no billing unit.
pub fn normalized_units(kind: &str, quantity: Option<&Quantity>) -> Result<i64> {
    let unit = price_unit(kind).ok_or_else(|| BillingError::UnknownResource(kind.to_string()))?;
    let Some(quantity) = quantity.filter(|q| !q.is_zero()) else {
        return Ok(0);
    };

    let value = quantity.milli_value();
    let divisor = unit.milli_value();
    let units = value.div_euclid(divisor) + i64::from(value.rem_euclid(divisor) != 0);
    Ok(units)
}

/// A quantity together with a free-text description of where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantityDetail {
    /// The measured quantity.
    pub quantity: Quantity,
    /// Free-text detail.
    pub detail: String,
}

/// Look up a resource in a usage map and normalize it.
///
/// # Errors
///
/// Returns `BillingError::UnknownResource` if the kind has no billing unit.
pub fn resource_value<S: std::hash::BuildHasher>(
    kind: &str,
    resources: &HashMap<String, QuantityDetail, S>,
) -> Result<i64> {
    normalized_units(kind, resources.get(kind).map(|d| &d.quantity))
}

fn flavor_lookup(table: &[(&str, i64)], flavor: &str) -> Option<i64> {
    table.iter().find(|(f, _)| *f == flavor).map(|(_, v)| *v)
}

/// Total cores for `count` instances of a flavor.
#[must_use]
pub fn infra_cpu_quantity(flavor: &str, count: i64) -> Option<Quantity> {
    let cores = flavor_lookup(&INFRA_CPU, flavor)?.checked_mul(count)?;
    Quantity::new(cores, Format::DecimalSI).ok()
}

/// Total memory for `count` instances of a flavor.
#[must_use]
pub fn infra_memory_quantity(flavor: &str, count: i64) -> Option<Quantity> {
    let bytes = flavor_lookup(&INFRA_MEMORY, flavor)?
        .checked_mul(count)?
        .checked_mul(GI)?;
    Quantity::new(bytes, Format::BinarySI).ok()
}

/// Disk quantity for a capacity in GiB.
#[must_use]
pub fn infra_disk_quantity(capacity_gib: i64) -> Option<Quantity> {
    Quantity::new(capacity_gib.checked_mul(GI)?, Format::BinarySI).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(s: &str) -> Quantity {
        Quantity::parse(s).unwrap()
    }

    #[test]
    fn cpu_millicores() {
        assert_eq!(normalized_units(RESOURCE_CPU, Some(&q("1500m"))).unwrap(), 1500);
        assert_eq!(normalized_units(RESOURCE_CPU, Some(&q("2"))).unwrap(), 2000);
    }

    #[test]
    fn memory_remainder_rounds_up() {
        let bytes = Quantity::new(10 * MI + 1, Format::BinarySI).unwrap();
        assert_eq!(normalized_units(RESOURCE_MEMORY, Some(&bytes)).unwrap(), 11);
        assert_eq!(normalized_units(RESOURCE_MEMORY, Some(&q("10Mi"))).unwrap(), 10);
        assert_eq!(normalized_units(RESOURCE_STORAGE, Some(&q("1Gi"))).unwrap(), 1024);
        assert_eq!(normalized_units(RESOURCE_NETWORK, Some(&q("1"))).unwrap(), 1);
    }

    #[test]
    fn missing_or_zero_is_zero_units() {
        assert_eq!(normalized_units(RESOURCE_CPU, None).unwrap(), 0);
        assert_eq!(normalized_units(RESOURCE_MEMORY, Some(&Quantity::zero())).unwrap(), 0);
    }

    #[test]
    fn monotonic_in_quantity() {
        let mut previous = 0;
        for bytes in (0..5 * MI).step_by(99_991) {
            let quantity = Quantity::new(bytes, Format::BinarySI).unwrap();
            let units = normalized_units(RESOURCE_MEMORY, Some(&quantity)).unwrap();
            assert!(units >= previous);
            previous = units;
        }
    }

    #[test]
    fn gpu_kinds_use_gpu_unit() {
        let name = gpu_resource("tesla-v100");
        assert_eq!(name, "gpu-tesla-v100");
        assert!(is_gpu_resource(&name));
        assert_eq!(gpu_product(&name), "tesla-v100");
        assert_eq!(normalized_units(&name, Some(&q("1"))).unwrap(), 1000);
        assert_eq!(normalized_units(RESOURCE_GPU, Some(&q("500m"))).unwrap(), 500);
    }

    #[test]
    fn unknown_kind_is_an_error() {
        assert!(matches!(
            normalized_units("bandwidth", Some(&q("1"))),
            Err(BillingError::UnknownResource(_))
        ));
    }

    #[test]
    fn resource_value_reads_map() {
        let mut resources = HashMap::new();
        resources.insert(
            RESOURCE_CPU.to_string(),
            QuantityDetail {
                quantity: q("250m"),
                detail: "pod/web-0".into(),
            },
        );
        assert_eq!(resource_value(RESOURCE_CPU, &resources).unwrap(), 250);
        assert_eq!(resource_value(RESOURCE_MEMORY, &resources).unwrap(), 0);
    }

    #[test]
    fn infra_flavors() {
        assert_eq!(infra_cpu_quantity("t2.xlarge", 2).unwrap().value(), 8);
        assert_eq!(infra_memory_quantity("t2.large", 1).unwrap(), q("8Gi"));
        assert_eq!(infra_disk_quantity(20).unwrap(), q("20Gi"));
        assert!(infra_cpu_quantity("m5.huge", 1).is_none());
    }

    #[test]
    fn infra_properties_normalize() {
        let cores = infra_cpu_quantity("ecs.g7.xlarge", 3);
        assert_eq!(normalized_units(PROPERTY_INFRA_CPU, cores.as_ref()).unwrap(), 12_000);

        let memory = infra_memory_quantity("t2.medium", 2);
        assert_eq!(normalized_units(PROPERTY_INFRA_MEMORY, memory.as_ref()).unwrap(), 8 * 1024);

        let disk = infra_disk_quantity(40);
        assert_eq!(normalized_units(PROPERTY_INFRA_DISK, disk.as_ref()).unwrap(), 40 * 1024);
    }
}

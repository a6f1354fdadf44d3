//! The price registry.
//!
//! A [`PropertyRegistry`] is built once at startup and shared read-only
//! (typically behind an `Arc`). It has no mutation API, so concurrent readers
//! need no locking.

use std::collections::{BTreeMap, HashMap};

use crate::crypto::PriceCipher;
use crate::error::{BillingError, Result};
use crate::monitor::EnumUsedMap;
use crate::property::{default_property_types, PropertyType};
use crate::quantity::Quantity;
use crate::units::{gpu_product, is_gpu_resource, GPU_RESOURCE_PREFIX};

/// Name of the generic GPU property that per-product GPUs price against.
pub const GPU_PROPERTY: &str = "gpu";

/// Immutable view over a list of billable properties, indexed by name and enum id.
#[derive(Debug, Clone)]
pub struct PropertyRegistry {
    types: Vec<PropertyType>,
    by_name: HashMap<String, usize>,
    by_enum: HashMap<u8, usize>,
}

/// A property resolved from a resource name.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved<'a> {
    /// The matching property.
    pub property: &'a PropertyType,
    /// The GPU product id when the name carried one.
    pub product: Option<&'a str>,
}

impl PropertyRegistry {
    /// Build a registry from plaintext properties.
    ///
    /// Unit strings are parsed once; properties that already carry a parsed unit
    /// are left untouched.
    ///
    /// # Errors
    ///
    /// - `BillingError::InvalidUnit` if a unit string is malformed.
    /// - `BillingError::DuplicateProperty` if a name or enum id repeats.
    pub fn build(mut types: Vec<PropertyType>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(types.len());
        let mut by_enum = HashMap::with_capacity(types.len());

        for (index, property) in types.iter_mut().enumerate() {
            if property.unit.is_none() && !property.unit_string.is_empty() {
                let unit =
                    Quantity::parse(&property.unit_string).map_err(|source| {
                        BillingError::InvalidUnit {
                            name: property.name.clone(),
                            source,
                        }
                    })?;
                property.unit = Some(unit);
            }

            if by_name.insert(property.name.clone(), index).is_some() {
                return Err(BillingError::DuplicateProperty {
                    field: "name",
                    value: property.name.clone(),
                });
            }
            if by_enum.insert(property.enum_id, index).is_some() {
                return Err(BillingError::DuplicateProperty {
                    field: "enum",
                    value: property.enum_id.to_string(),
                });
            }
        }

        Ok(Self {
            types,
            by_name,
            by_enum,
        })
    }

    /// The built-in default registry.
    ///
    /// # Panics
    ///
    /// Never in practice: the default list has valid units and unique keys.
    #[must_use]
    pub fn defaults() -> Self {
        // INVARIANT: default_property_types() is a static, valid table.
        Self::build(default_property_types()).expect("default property table is valid")
    }

    /// Decrypt every sealed price into a scratch copy of `types`.
    ///
    /// Either all prices decrypt or none are returned.
    ///
    /// # Errors
    ///
    /// - `BillingError::MissingEncryptedPrice` if any entry has no ciphertext.
    /// - `BillingError::PriceDecryption` if any ciphertext fails to open.
    pub fn decrypt_prices(types: &[PropertyType], cipher: &PriceCipher) -> Result<Vec<PropertyType>> {
        types
            .iter()
            .map(|property| {
                if property.encrypt_unit_price.is_empty() {
                    return Err(BillingError::MissingEncryptedPrice {
                        name: property.name.clone(),
                    });
                }
                let unit_price = cipher
                    .decrypt_int64(&property.encrypt_unit_price)
                    .map_err(|source| BillingError::PriceDecryption {
                        name: property.name.clone(),
                        source,
                    })?;
                Ok(PropertyType {
                    unit_price,
                    ..property.clone()
                })
            })
            .collect()
    }

    /// Load the registry from sealed prices, falling back to the defaults.
    ///
    /// If any price is missing or fails to decrypt, or the decrypted table does
    /// not build, the whole input is discarded and the default registry is used.
    #[must_use]
    pub fn load(types: &[PropertyType], cipher: Option<&PriceCipher>) -> Self {
        match Self::try_load(types, cipher) {
            Ok(registry) => {
                tracing::info!(properties = registry.len(), "Loaded decrypted price registry");
                registry
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load prices, using default price table");
                Self::defaults()
            }
        }
    }

    fn try_load(types: &[PropertyType], cipher: Option<&PriceCipher>) -> Result<Self> {
        let cipher = cipher
            .ok_or_else(|| BillingError::Configuration("price encryption key not set".into()))?;
        if types.is_empty() {
            return Err(BillingError::Configuration("no property types configured".into()));
        }
        Self::build(Self::decrypt_prices(types, cipher)?)
    }

    /// All properties in declaration order.
    #[must_use]
    pub fn types(&self) -> &[PropertyType] {
        &self.types
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Look up a property by exact name.
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&PropertyType> {
        self.by_name.get(name).map(|&i| &self.types[i])
    }

    /// Look up a property by enumeration id.
    #[must_use]
    pub fn by_enum(&self, enum_id: u8) -> Option<&PropertyType> {
        self.by_enum.get(&enum_id).map(|&i| &self.types[i])
    }

    /// Unit price of a property by enumeration id.
    #[must_use]
    pub fn unit_price(&self, enum_id: u8) -> Option<i64> {
        self.by_enum(enum_id).map(|p| p.unit_price)
    }

    /// Resolve a resource name to its property.
    ///
    /// Exact names win. Per-product GPU names (`gpu-<product>`) otherwise
    /// resolve by prefix: first to the generic `gpu` property, then to the
    /// lowest-enum property carrying the prefix.
    #[must_use]
    pub fn resolve<'a>(&'a self, name: &'a str) -> Option<Resolved<'a>> {
        let product = is_gpu_resource(name).then(|| gpu_product(name));

        if let Some(property) = self.by_name(name) {
            return Some(Resolved { property, product });
        }
        product?;

        let property = self.by_name(GPU_PROPERTY).or_else(|| {
            self.types
                .iter()
                .filter(|p| p.name.starts_with(GPU_RESOURCE_PREFIX))
                .min_by_key(|p| p.enum_id)
        })?;
        Some(Resolved { property, product })
    }

    /// Translate an enum-keyed usage map into a name-keyed one.
    ///
    /// Ids not present in the registry are omitted.
    #[must_use]
    pub fn enum_used_to_names(&self, used: &EnumUsedMap) -> BTreeMap<String, i64> {
        used.iter()
            .filter_map(|(id, amount)| self.by_enum(*id).map(|p| (p.name.clone(), *amount)))
            .collect()
    }

    /// Translate a name-keyed usage map into an enum-keyed one.
    ///
    /// Names are resolved with [`Self::resolve`]; unresolvable names are omitted.
    /// Amounts for names resolving to the same property are summed.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Overflow` if a summed amount overflows.
    pub fn names_to_enum_used(&self, used: &BTreeMap<String, i64>) -> Result<EnumUsedMap> {
        let mut out = EnumUsedMap::new();
        for (name, amount) in used {
            if let Some(resolved) = self.resolve(name) {
                let slot = out.entry(resolved.property.enum_id).or_insert(0);
                *slot = slot
                    .checked_add(*amount)
                    .ok_or_else(|| BillingError::Overflow(format!("usage of {name}")))?;
            }
        }
        Ok(out)
    }
}

impl Default for PropertyRegistry {
    fn default() -> Self {
        Self::defaults()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::MI;

    fn sealed_types(cipher: &PriceCipher, prices: &[(&str, u8, i64, &str)]) -> Vec<PropertyType> {
        prices
            .iter()
            .map(|(name, id, price, unit)| {
                PropertyType::new(*name, *id, 0, *unit)
                    .with_encrypted_price(cipher.encrypt_int64(*price).unwrap())
            })
            .collect()
    }

    #[test]
    fn build_indexes_both_ways() {
        let registry = PropertyRegistry::defaults();
        for property in registry.types() {
            let by_name = registry.by_name(&property.name).unwrap();
            assert_eq!(registry.by_enum(by_name.enum_id).unwrap().name, property.name);
        }
        assert_eq!(registry.by_name("memory").unwrap().unit.unwrap().milli_value(), MI * 1000);
        assert_eq!(registry.unit_price(3), Some(781));
    }

    #[test]
    fn build_keeps_preparsed_units() {
        let mut cpu = PropertyType::new("cpu", 0, 67, "not-a-quantity");
        cpu.unit = Some(Quantity::parse("1m").unwrap());
        let registry = PropertyRegistry::build(vec![cpu]).unwrap();
        assert_eq!(registry.by_enum(0).unwrap().unit.unwrap().milli_value(), 1);
    }

    #[test]
    fn build_rejects_bad_unit_and_duplicates() {
        let bad = PropertyRegistry::build(vec![PropertyType::new("cpu", 0, 67, "1Xi")]);
        assert!(matches!(bad, Err(BillingError::InvalidUnit { .. })));

        let dup_enum = PropertyRegistry::build(vec![
            PropertyType::new("cpu", 0, 67, "1m"),
            PropertyType::new("memory", 0, 33, "1Mi"),
        ]);
        assert!(matches!(
            dup_enum,
            Err(BillingError::DuplicateProperty { field: "enum", .. })
        ));

        let dup_name = PropertyRegistry::build(vec![
            PropertyType::new("cpu", 0, 67, "1m"),
            PropertyType::new("cpu", 1, 33, "1m"),
        ]);
        assert!(matches!(
            dup_name,
            Err(BillingError::DuplicateProperty { field: "name", .. })
        ));
    }

    #[test]
    fn load_decrypts_all_prices() {
        let cipher = PriceCipher::new("k");
        let types = sealed_types(&cipher, &[("cpu", 0, 100, "1m"), ("memory", 1, 50, "1Mi")]);
        let registry = PropertyRegistry::load(&types, Some(&cipher));
        assert_eq!(registry.unit_price(0), Some(100));
        assert_eq!(registry.unit_price(1), Some(50));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn one_missing_ciphertext_falls_back_to_defaults() {
        let cipher = PriceCipher::new("k");
        let mut types = sealed_types(&cipher, &[("cpu", 0, 100, "1m"), ("memory", 1, 50, "1Mi")]);
        types[1].encrypt_unit_price.clear();

        let registry = PropertyRegistry::load(&types, Some(&cipher));
        assert_eq!(registry.types(), PropertyRegistry::defaults().types());
        assert_eq!(registry.unit_price(0), Some(67));
    }

    #[test]
    fn wrong_key_or_missing_cipher_falls_back_to_defaults() {
        let types = sealed_types(&PriceCipher::new("right"), &[("cpu", 0, 100, "1m")]);

        let wrong = PropertyRegistry::load(&types, Some(&PriceCipher::new("wrong")));
        assert_eq!(wrong.types(), PropertyRegistry::defaults().types());

        let none = PropertyRegistry::load(&types, None);
        assert_eq!(none.types(), PropertyRegistry::defaults().types());
    }

    #[test]
    fn decrypt_prices_reports_first_failure() {
        let cipher = PriceCipher::new("k");
        let types = vec![PropertyType::new("cpu", 0, 0, "1m")];
        assert!(matches!(
            PropertyRegistry::decrypt_prices(&types, &cipher),
            Err(BillingError::MissingEncryptedPrice { name }) if name == "cpu"
        ));
    }

    #[test]
    fn enum_translation_omits_unknown_ids() {
        let registry = PropertyRegistry::defaults();
        let used = EnumUsedMap::from([(0, 1000), (1, 500), (42, 7)]);
        let names = registry.enum_used_to_names(&used);
        assert_eq!(names.len(), 2);
        assert_eq!(names["cpu"], 1000);
        assert_eq!(names["memory"], 500);

        let back = registry.names_to_enum_used(&names).unwrap();
        assert_eq!(back, EnumUsedMap::from([(0, 1000), (1, 500)]));
    }

    #[test]
    fn gpu_resolves_by_prefix() {
        let mut types = default_property_types();
        types.push(PropertyType::new(GPU_PROPERTY, 4, 2000, "1m"));
        let registry = PropertyRegistry::build(types).unwrap();

        let resolved = registry.resolve("gpu-tesla-v100").unwrap();
        assert_eq!(resolved.property.name, GPU_PROPERTY);
        assert_eq!(resolved.product, Some("tesla-v100"));
        assert_eq!(resolved.property.unit.unwrap().milli_value(), 1);

        let cpu = registry.resolve("cpu").unwrap();
        assert_eq!(cpu.property.enum_id, 0);
        assert_eq!(cpu.product, None);

        assert!(registry.resolve("disk").is_none());
    }

    #[test]
    fn summing_products_of_one_property_is_checked() {
        let registry =
            PropertyRegistry::build(vec![PropertyType::new(GPU_PROPERTY, 4, 2000, "1m")]).unwrap();

        let used = BTreeMap::from([("gpu-a".to_string(), 3), ("gpu-b".to_string(), 4)]);
        assert_eq!(
            registry.names_to_enum_used(&used).unwrap(),
            EnumUsedMap::from([(4, 7)])
        );

        let used = BTreeMap::from([("gpu-a".to_string(), i64::MAX), ("gpu-b".to_string(), 1)]);
        assert!(matches!(
            registry.names_to_enum_used(&used),
            Err(BillingError::Overflow(_))
        ));
    }

    #[test]
    fn gpu_prefers_exact_product_entry() {
        let registry = PropertyRegistry::build(vec![
            PropertyType::new(GPU_PROPERTY, 4, 2000, "1m"),
            PropertyType::new("gpu-a100", 5, 5000, "1m"),
        ])
        .unwrap();
        assert_eq!(registry.resolve("gpu-a100").unwrap().property.unit_price, 5000);
        assert_eq!(registry.resolve("gpu-t4").unwrap().property.unit_price, 2000);

        let product_only =
            PropertyRegistry::build(vec![PropertyType::new("gpu-a100", 5, 5000, "1m")]).unwrap();
        let resolved = product_only.resolve("gpu-t4").unwrap();
        assert_eq!(resolved.property.enum_id, 5);
        assert_eq!(resolved.product, Some("t4"));
    }
}

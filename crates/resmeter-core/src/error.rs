//! Error types for resmeter.

use crate::crypto::CryptoError;
use crate::ids::IdError;
use crate::quantity::QuantityError;

/// Result type for resmeter operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur while pricing usage or building ledger records.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// A property declares a unit string that is not a valid quantity.
    #[error("invalid unit for property {name}: {source}")]
    InvalidUnit {
        /// The property name.
        name: String,
        /// The underlying parse error.
        #[source]
        source: QuantityError,
    },

    /// Two properties in one registry share a name or enumeration id.
    #[error("duplicate property {field}: {value}")]
    DuplicateProperty {
        /// Which field collided (`name` or `enum`).
        field: &'static str,
        /// The colliding value.
        value: String,
    },

    /// A property in the encrypted price input has no ciphertext.
    #[error("encrypted unit price of {name} is empty")]
    MissingEncryptedPrice {
        /// The property name.
        name: String,
    },

    /// A property's encrypted price could not be decrypted.
    #[error("failed to decrypt unit price of {name}: {source}")]
    PriceDecryption {
        /// The property name.
        name: String,
        /// The underlying crypto error.
        #[source]
        source: CryptoError,
    },

    /// A property name or enumeration id is not in the registry.
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// A resource kind has no billing unit.
    #[error("unknown resource kind: {0}")]
    UnknownResource(String),

    /// Invalid quantity.
    #[error("invalid quantity: {0}")]
    Quantity(#[from] QuantityError),

    /// Monetary arithmetic overflowed.
    #[error("amount overflow: {0}")]
    Overflow(String),

    /// A billing record violates a ledger invariant.
    #[error("invalid billing: {0}")]
    InvalidBilling(String),

    /// Unknown application type tag.
    #[error("invalid app type: {0}")]
    InvalidAppType(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

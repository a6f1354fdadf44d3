//! Raw usage samples.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::BillingError;

/// Usage keyed by property enumeration id.
pub type EnumUsedMap = BTreeMap<u8, i64>;

/// Kind of application a sample was taken from.
///
/// Persisted as its numeric tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum AppType {
    /// Database cluster.
    Db = 1,
    /// Application deployment.
    App = 2,
    /// Web terminal.
    Terminal = 3,
    /// Batch job.
    Job = 4,
    /// Anything else.
    Other = 5,
}

impl AppType {
    /// All application types in tag order.
    pub const ALL: [Self; 5] = [Self::Db, Self::App, Self::Terminal, Self::Job, Self::Other];

    /// Upper-case name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Db => "DB",
            Self::App => "APP",
            Self::Terminal => "TERMINAL",
            Self::Job => "JOB",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for AppType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppType {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| BillingError::InvalidAppType(s.to_string()))
    }
}

impl TryFrom<u8> for AppType {
    type Error = BillingError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|t| *t as u8 == value)
            .ok_or_else(|| BillingError::InvalidAppType(value.to_string()))
    }
}

impl From<AppType> for u8 {
    fn from(t: AppType) -> Self {
        t as u8
    }
}

/// One raw usage observation.
///
/// Written by the collector at fixed intervals and never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    /// Sample time.
    pub time: DateTime<Utc>,

    /// Billed entity, a namespace or application id.
    pub category: String,

    /// Application type.
    #[serde(rename = "type")]
    pub app_type: AppType,

    /// Name of the sampled object.
    pub name: String,

    /// Observed amounts by property enumeration id.
    pub used: EnumUsedMap,

    /// Property name.
    pub property: String,
}

//! The billing ledger.
//!
//! A [`Billing`] entry is a snapshot: its amount and per-application breakdown
//! are fixed when it is created and never recomputed. The only transition is
//! `Unsettled -> Settled`.
//!
//! Consumption entries always carry a [`Payment`] and transfer entries always
//! carry a [`Transfer`]. [`BillingKind`] makes the pairing structural, and the
//! flat [`BillingRecord`] used on the wire is validated on the way in.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::ids::OrderId;
use crate::metering::amount;
use crate::monitor::{AppType, EnumUsedMap};
use crate::registry::PropertyRegistry;

/// Ledger entry type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum BillingType {
    /// Resource consumption.
    Consumption = 0,
    /// Balance top-up.
    Recharge = 1,
    /// Transfer between accounts.
    Transfer = 2,
    /// Refund.
    Refund = 3,
}

impl TryFrom<u8> for BillingType {
    type Error = BillingError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Consumption),
            1 => Ok(Self::Recharge),
            2 => Ok(Self::Transfer),
            3 => Ok(Self::Refund),
            other => Err(BillingError::InvalidBilling(format!(
                "unknown billing type {other}"
            ))),
        }
    }
}

impl From<BillingType> for u8 {
    fn from(t: BillingType) -> Self {
        t as u8
    }
}

/// Settlement state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
#[repr(u8)]
pub enum BillingStatus {
    /// Not yet settled.
    #[default]
    Unsettled = 0,
    /// Settled. Terminal.
    Settled = 1,
}

impl TryFrom<u8> for BillingStatus {
    type Error = BillingError;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::Unsettled),
            1 => Ok(Self::Settled),
            other => Err(BillingError::InvalidBilling(format!(
                "unknown billing status {other}"
            ))),
        }
    }
}

impl From<BillingStatus> for u8 {
    fn from(s: BillingStatus) -> Self {
        s as u8
    }
}

/// Payment details of a consumption entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Payment method.
    pub method: String,

    /// Paying user.
    pub user_id: String,

    /// Paid amount.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub amount: i64,

    /// Gateway trade number.
    #[serde(rename = "tradeNO", default, skip_serializing_if = "String::is_empty")]
    pub trade_no: String,

    /// Gateway payment URL.
    #[serde(rename = "codeURL", default, skip_serializing_if = "String::is_empty")]
    pub code_url: String,
}

/// Transfer details of a transfer entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transfer {
    /// Source account.
    pub from: String,
    /// Destination account.
    pub to: String,
    /// Transferred amount.
    pub amount: i64,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_zero(v: &i64) -> bool {
    *v == 0
}

/// Per-application share of a billing entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppCost {
    /// Application name.
    pub name: String,

    /// Used amounts in billing units, by property id.
    pub used: EnumUsedMap,

    /// Priced amounts, by property id.
    pub used_amount: EnumUsedMap,

    /// Total for this application.
    pub amount: i64,
}

impl AppCost {
    /// Price an application's usage against the registry.
    ///
    /// # Errors
    ///
    /// - `BillingError::UnknownProperty` if an id is not in the registry.
    /// - `BillingError::Overflow` if any product or the total overflows.
    pub fn price(name: impl Into<String>, used: EnumUsedMap, registry: &PropertyRegistry) -> Result<Self> {
        let mut used_amount = EnumUsedMap::new();
        for (&id, &value) in &used {
            let unit_price = registry
                .unit_price(id)
                .ok_or_else(|| BillingError::UnknownProperty(id.to_string()))?;
            used_amount.insert(id, amount(value, unit_price)?);
        }
        let total = checked_sum(used_amount.values().copied())?;

        Ok(Self {
            name: name.into(),
            used,
            used_amount,
            amount: total,
        })
    }

    /// Used amounts keyed by property name. Unknown ids are omitted.
    #[must_use]
    pub fn used_by_name(&self, registry: &PropertyRegistry) -> BTreeMap<String, i64> {
        registry.enum_used_to_names(&self.used)
    }

    /// Priced amounts keyed by property name. Unknown ids are omitted.
    #[must_use]
    pub fn used_amount_by_name(&self, registry: &PropertyRegistry) -> BTreeMap<String, i64> {
        registry.enum_used_to_names(&self.used_amount)
    }

    fn validate(&self) -> Result<()> {
        if let Some(id) = self.used_amount.keys().find(|id| !self.used.contains_key(id)) {
            return Err(BillingError::InvalidBilling(format!(
                "app {} prices property {id} it did not use",
                self.name
            )));
        }
        let sum = checked_sum(self.used_amount.values().copied())?;
        if sum != self.amount {
            return Err(BillingError::InvalidBilling(format!(
                "app {} amount {} does not match priced usage {sum}",
                self.name, self.amount
            )));
        }
        Ok(())
    }
}

fn checked_sum(values: impl IntoIterator<Item = i64>) -> Result<i64> {
    values.into_iter().try_fold(0i64, |acc, v| {
        acc.checked_add(v)
            .ok_or_else(|| BillingError::Overflow("billing total".into()))
    })
}

/// Type-specific payload of a billing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingKind {
    /// Consumption, paid by the attached payment.
    Consumption(Payment),
    /// Transfer between accounts.
    Transfer(Transfer),
    /// Balance top-up.
    Recharge,
    /// Refund.
    Refund,
}

impl BillingKind {
    /// The wire type tag of this kind.
    #[must_use]
    pub const fn billing_type(&self) -> BillingType {
        match self {
            Self::Consumption(_) => BillingType::Consumption,
            Self::Transfer(_) => BillingType::Transfer,
            Self::Recharge => BillingType::Recharge,
            Self::Refund => BillingType::Refund,
        }
    }
}

/// Flat persisted shape of a billing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingRecord {
    /// Entry time.
    pub time: DateTime<Utc>,

    /// Order identifier.
    pub order_id: OrderId,

    /// Entry type.
    #[serde(rename = "type")]
    pub billing_type: BillingType,

    /// Billed namespace.
    pub namespace: String,

    /// Per-application breakdown.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub app_costs: Vec<AppCost>,

    /// Application type, when the entry covers a single kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_type: Option<AppType>,

    /// Total amount.
    pub amount: i64,

    /// Owner identity.
    #[serde(default)]
    pub owner: String,

    /// Settlement state.
    #[serde(default)]
    pub status: BillingStatus,

    /// Payment, present iff the type is consumption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,

    /// Transfer, present iff the type is transfer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer: Option<Transfer>,
}

/// A validated billing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "BillingRecord", into = "BillingRecord")]
pub struct Billing {
    time: DateTime<Utc>,
    order_id: OrderId,
    namespace: String,
    owner: String,
    amount: i64,
    status: BillingStatus,
    app_type: Option<AppType>,
    app_costs: Vec<AppCost>,
    kind: BillingKind,
}

impl Billing {
    /// Create an unsettled consumption entry whose amount is the sum of `app_costs`.
    ///
    /// # Errors
    ///
    /// Returns an error if an app cost is inconsistent or the total overflows.
    pub fn consumption(
        namespace: impl Into<String>,
        owner: impl Into<String>,
        app_type: Option<AppType>,
        app_costs: Vec<AppCost>,
        payment: Payment,
        time: DateTime<Utc>,
    ) -> Result<Self> {
        for cost in &app_costs {
            cost.validate()?;
        }
        let amount = checked_sum(app_costs.iter().map(|c| c.amount))?;
        Ok(Self {
            time,
            order_id: OrderId::generate(),
            namespace: namespace.into(),
            owner: owner.into(),
            amount,
            status: BillingStatus::Unsettled,
            app_type,
            app_costs,
            kind: BillingKind::Consumption(payment),
        })
    }

    /// Create an unsettled transfer entry for the transferred amount.
    #[must_use]
    pub fn transfer(
        namespace: impl Into<String>,
        owner: impl Into<String>,
        transfer: Transfer,
        time: DateTime<Utc>,
    ) -> Self {
        Self::simple(namespace, owner, transfer.amount, BillingKind::Transfer(transfer), time)
    }

    /// Create an unsettled recharge entry.
    #[must_use]
    pub fn recharge(
        namespace: impl Into<String>,
        owner: impl Into<String>,
        amount: i64,
        time: DateTime<Utc>,
    ) -> Self {
        Self::simple(namespace, owner, amount, BillingKind::Recharge, time)
    }

    /// Create an unsettled refund entry.
    #[must_use]
    pub fn refund(
        namespace: impl Into<String>,
        owner: impl Into<String>,
        amount: i64,
        time: DateTime<Utc>,
    ) -> Self {
        Self::simple(namespace, owner, amount, BillingKind::Refund, time)
    }

    fn simple(
        namespace: impl Into<String>,
        owner: impl Into<String>,
        amount: i64,
        kind: BillingKind,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            time,
            order_id: OrderId::generate(),
            namespace: namespace.into(),
            owner: owner.into(),
            amount,
            status: BillingStatus::Unsettled,
            app_type: None,
            app_costs: Vec::new(),
            kind,
        }
    }

    /// Entry time.
    #[must_use]
    pub const fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Order identifier.
    #[must_use]
    pub const fn order_id(&self) -> OrderId {
        self.order_id
    }

    /// Entry type.
    #[must_use]
    pub const fn billing_type(&self) -> BillingType {
        self.kind.billing_type()
    }

    /// Billed namespace.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Owner identity.
    #[must_use]
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Total amount.
    #[must_use]
    pub const fn amount(&self) -> i64 {
        self.amount
    }

    /// Settlement state.
    #[must_use]
    pub const fn status(&self) -> BillingStatus {
        self.status
    }

    /// Whether the entry is settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.status == BillingStatus::Settled
    }

    /// Application type.
    #[must_use]
    pub const fn app_type(&self) -> Option<AppType> {
        self.app_type
    }

    /// Per-application breakdown.
    #[must_use]
    pub fn app_costs(&self) -> &[AppCost] {
        &self.app_costs
    }

    /// Type-specific payload.
    #[must_use]
    pub const fn kind(&self) -> &BillingKind {
        &self.kind
    }

    /// The payment of a consumption entry.
    #[must_use]
    pub const fn payment(&self) -> Option<&Payment> {
        match &self.kind {
            BillingKind::Consumption(p) => Some(p),
            _ => None,
        }
    }

    /// The transfer of a transfer entry.
    #[must_use]
    pub const fn transfer_details(&self) -> Option<&Transfer> {
        match &self.kind {
            BillingKind::Transfer(t) => Some(t),
            _ => None,
        }
    }

    /// Mark the entry settled.
    ///
    /// Returns `true` if the status changed. Settling a settled entry is a no-op.
    pub fn settle(&mut self) -> bool {
        if self.is_settled() {
            return false;
        }
        self.status = BillingStatus::Settled;
        true
    }

    /// Used amounts over all applications, keyed by property name.
    ///
    /// Unknown ids are omitted.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Overflow` if a summed amount overflows.
    pub fn used_by_name(&self, registry: &PropertyRegistry) -> Result<BTreeMap<String, i64>> {
        let mut out = BTreeMap::new();
        for cost in &self.app_costs {
            for (name, value) in cost.used_by_name(registry) {
                let slot = out.entry(name).or_insert(0i64);
                *slot = slot
                    .checked_add(value)
                    .ok_or_else(|| BillingError::Overflow("billing usage".into()))?;
            }
        }
        Ok(out)
    }
}

impl TryFrom<BillingRecord> for Billing {
    type Error = BillingError;

    fn try_from(record: BillingRecord) -> Result<Self> {
        let kind = match (record.billing_type, record.payment, record.transfer) {
            (BillingType::Consumption, Some(payment), None) => BillingKind::Consumption(payment),
            (BillingType::Transfer, None, Some(transfer)) => BillingKind::Transfer(transfer),
            (BillingType::Recharge, None, None) => BillingKind::Recharge,
            (BillingType::Refund, None, None) => BillingKind::Refund,
            (t, payment, transfer) => {
                return Err(BillingError::InvalidBilling(format!(
                    "type {t:?} with payment: {}, transfer: {}",
                    payment.is_some(),
                    transfer.is_some()
                )));
            }
        };

        if !record.app_costs.is_empty() {
            for cost in &record.app_costs {
                cost.validate()?;
            }
            let sum = checked_sum(record.app_costs.iter().map(|c| c.amount))?;
            if sum != record.amount {
                return Err(BillingError::InvalidBilling(format!(
                    "amount {} does not match app costs {sum}",
                    record.amount
                )));
            }
        }

        Ok(Self {
            time: record.time,
            order_id: record.order_id,
            namespace: record.namespace,
            owner: record.owner,
            amount: record.amount,
            status: record.status,
            app_type: record.app_type,
            app_costs: record.app_costs,
            kind,
        })
    }
}

impl From<Billing> for BillingRecord {
    fn from(billing: Billing) -> Self {
        let billing_type = billing.billing_type();
        let (payment, transfer) = match billing.kind {
            BillingKind::Consumption(p) => (Some(p), None),
            BillingKind::Transfer(t) => (None, Some(t)),
            BillingKind::Recharge | BillingKind::Refund => (None, None),
        };
        Self {
            time: billing.time,
            order_id: billing.order_id,
            billing_type,
            namespace: billing.namespace,
            app_costs: billing.app_costs,
            app_type: billing.app_type,
            amount: billing.amount,
            owner: billing.owner,
            status: billing.status,
            payment,
            transfer,
        }
    }
}

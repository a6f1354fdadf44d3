//! Billing ledger handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use resmeter_core::{
    AppCost, AppType, Billing, BillingRecord, BillingStatus, BillingType, OrderId, Payment,
    PropertyRegistry, Transfer,
};

use crate::auth::{AdminAuth, ServiceAuth};
use crate::error::ApiError;
use crate::handlers::{page_limit, used_by_enum};
use crate::state::AppState;

/// Billing type as named over the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingTypeName {
    /// Resource consumption.
    Consumption,
    /// Balance top-up.
    Recharge,
    /// Transfer between accounts.
    Transfer,
    /// Refund.
    Refund,
}

impl From<BillingTypeName> for BillingType {
    fn from(t: BillingTypeName) -> Self {
        match t {
            BillingTypeName::Consumption => Self::Consumption,
            BillingTypeName::Recharge => Self::Recharge,
            BillingTypeName::Transfer => Self::Transfer,
            BillingTypeName::Refund => Self::Refund,
        }
    }
}

impl From<BillingType> for BillingTypeName {
    fn from(t: BillingType) -> Self {
        match t {
            BillingType::Consumption => Self::Consumption,
            BillingType::Recharge => Self::Recharge,
            BillingType::Transfer => Self::Transfer,
            BillingType::Refund => Self::Refund,
        }
    }
}

/// Per-application usage in a billing request.
#[derive(Debug, Deserialize)]
pub struct AppCostRequest {
    /// Application name.
    pub name: String,
    /// Used amounts in billing units, keyed by property name.
    pub used: BTreeMap<String, i64>,
}

/// Create-billing request.
#[derive(Debug, Deserialize)]
pub struct CreateBillingRequest {
    /// Order ID for idempotent retries (default: generated).
    pub order_id: Option<OrderId>,
    /// Entry type.
    #[serde(rename = "type")]
    pub billing_type: BillingTypeName,
    /// Billed namespace.
    pub namespace: String,
    /// Owner identity.
    #[serde(default)]
    pub owner: String,
    /// Entry time (default: now).
    pub time: Option<DateTime<Utc>>,
    /// Application type, e.g. `"APP"`.
    pub app_type: Option<String>,
    /// Usage per application; priced against the active registry.
    #[serde(default)]
    pub app_costs: Vec<AppCostRequest>,
    /// Total amount. Derived from app costs or the transfer when omitted.
    pub amount: Option<i64>,
    /// Payment, required for consumption.
    pub payment: Option<Payment>,
    /// Transfer, required for transfers.
    pub transfer: Option<Transfer>,
}

/// Per-application cost as returned by the API.
#[derive(Debug, Serialize)]
pub struct AppCostResponse {
    /// Application name.
    pub name: String,
    /// Used amounts keyed by property name.
    pub used: BTreeMap<String, i64>,
    /// Priced amounts keyed by property name.
    pub used_amount: BTreeMap<String, i64>,
    /// Total for this application.
    pub amount: i64,
}

/// A ledger entry as returned by the API.
#[derive(Debug, Serialize)]
pub struct BillingResponse {
    /// Order ID.
    pub order_id: OrderId,
    /// Entry time.
    pub time: DateTime<Utc>,
    /// Entry type.
    #[serde(rename = "type")]
    pub billing_type: BillingTypeName,
    /// Billed namespace.
    pub namespace: String,
    /// Owner identity.
    pub owner: String,
    /// Total amount.
    pub amount: i64,
    /// `unsettled` or `settled`.
    pub status: &'static str,
    /// Application type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_type: Option<String>,
    /// Per-application breakdown.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub app_costs: Vec<AppCostResponse>,
    /// Payment of a consumption entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
    /// Transfer of a transfer entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer: Option<Transfer>,
}

impl BillingResponse {
    fn new(billing: &Billing, registry: &PropertyRegistry) -> Self {
        Self {
            order_id: billing.order_id(),
            time: billing.time(),
            billing_type: billing.billing_type().into(),
            namespace: billing.namespace().to_string(),
            owner: billing.owner().to_string(),
            amount: billing.amount(),
            status: match billing.status() {
                BillingStatus::Unsettled => "unsettled",
                BillingStatus::Settled => "settled",
            },
            app_type: billing.app_type().map(|t| t.to_string()),
            app_costs: billing
                .app_costs()
                .iter()
                .map(|c| AppCostResponse {
                    name: c.name.clone(),
                    used: c.used_by_name(registry),
                    used_amount: c.used_amount_by_name(registry),
                    amount: c.amount,
                })
                .collect(),
            payment: billing.payment().cloned(),
            transfer: billing.transfer_details().cloned(),
        }
    }
}

/// Pagination query for listing a namespace's ledger.
#[derive(Debug, Deserialize)]
pub struct ListBillingQuery {
    /// Billed namespace.
    pub namespace: String,
    /// Page size.
    pub limit: Option<usize>,
    /// Entries to skip.
    #[serde(default)]
    pub offset: usize,
}

fn build_billing(
    body: CreateBillingRequest,
    registry: &PropertyRegistry,
) -> Result<Billing, ApiError> {
    if body.namespace.is_empty() {
        return Err(ApiError::BadRequest("namespace is required".into()));
    }
    let app_type = body
        .app_type
        .as_deref()
        .map(str::parse::<AppType>)
        .transpose()?;

    let app_costs = body
        .app_costs
        .into_iter()
        .map(|c| -> Result<AppCost, ApiError> {
            let used = used_by_enum(registry, &c.used)?;
            Ok(AppCost::price(c.name, used, registry)?)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let amount = if app_costs.is_empty() {
        body.amount
            .or_else(|| body.transfer.as_ref().map(|t| t.amount))
            .ok_or_else(|| ApiError::BadRequest("amount is required without app costs".into()))?
    } else if let Some(amount) = body.amount {
        // Checked against the app costs when the record is validated.
        amount
    } else {
        app_costs
            .iter()
            .try_fold(0i64, |acc, c| acc.checked_add(c.amount))
            .ok_or_else(|| ApiError::BadRequest("amount overflow".into()))?
    };

    let record = BillingRecord {
        time: body.time.unwrap_or_else(Utc::now),
        order_id: body.order_id.unwrap_or_else(OrderId::generate),
        billing_type: body.billing_type.into(),
        namespace: body.namespace,
        app_costs,
        app_type,
        amount,
        owner: body.owner,
        status: BillingStatus::Unsettled,
        payment: body.payment,
        transfer: body.transfer,
    };

    Ok(Billing::try_from(record)?)
}

/// Create a ledger entry.
///
/// Retrying with the same `order_id` returns the stored entry unchanged with `200 OK`.
pub async fn create_billing(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<CreateBillingRequest>,
) -> Result<(StatusCode, Json<BillingResponse>), ApiError> {
    let billing = build_billing(body, &state.registry)?;

    if !state.store.put_billing(&billing)? {
        let existing = state
            .store
            .get_billing(&billing.order_id())?
            .ok_or_else(|| ApiError::Internal("billing vanished after insert".into()))?;
        return Ok((
            StatusCode::OK,
            Json(BillingResponse::new(&existing, &state.registry)),
        ));
    }

    tracing::info!(
        service = %auth.service_name,
        order_id = %billing.order_id(),
        namespace = %billing.namespace(),
        amount = billing.amount(),
        "Billing created"
    );

    Ok((
        StatusCode::CREATED,
        Json(BillingResponse::new(&billing, &state.registry)),
    ))
}

/// List a namespace's ledger, newest first.
pub async fn list_billing(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListBillingQuery>,
) -> Result<Json<Vec<BillingResponse>>, ApiError> {
    let billings = state
        .store
        .list_billings(&query.namespace, page_limit(query.limit), query.offset)?;

    Ok(Json(
        billings
            .iter()
            .map(|b| BillingResponse::new(b, &state.registry))
            .collect(),
    ))
}

fn parse_order_id(raw: &str) -> Result<OrderId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid order ID: {raw}")))
}

/// Get a ledger entry.
pub async fn get_billing(
    State(state): State<Arc<AppState>>,
    Path(order_id): Path<String>,
) -> Result<Json<BillingResponse>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    let billing = state
        .store
        .get_billing(&order_id)?
        .ok_or_else(|| ApiError::NotFound(format!("billing not found: {order_id}")))?;

    Ok(Json(BillingResponse::new(&billing, &state.registry)))
}

/// Settle a ledger entry (admin only). Settling twice is a no-op.
pub async fn settle_billing(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Path(order_id): Path<String>,
) -> Result<Json<BillingResponse>, ApiError> {
    let order_id = parse_order_id(&order_id)?;
    let billing = state.store.settle_billing(&order_id)?;

    tracing::info!(admin_id = %admin.admin_id, order_id = %order_id, "Settle requested");

    Ok(Json(BillingResponse::new(&billing, &state.registry)))
}

//! Billing handlers: billing requests, delivery challans and tax invoices

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::RoleGroup;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::billing::{
    ApproveInvoiceInput, BillingDashboard, BillingFilter, BillingRequest, CreateBillingRequestInput,
    CreateChallanInput, CreateInvoiceInput, DeliveryChallan, TaxInvoice, UpdateChallanInput,
    UpdateInvoiceInput,
};
use crate::services::BillingService;
use crate::AppState;

// ---- Billing requests ----

pub async fn list_requests(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<BillingFilter>,
) -> AppResult<Json<Vec<BillingRequest>>> {
    user.require_any(&[RoleGroup::BillingExecutive, RoleGroup::DispatchExecutive])?;
    Ok(Json(BillingService::new(state.db.clone()).list_requests(filter).await?))
}

pub async fn get_request(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<BillingRequest>> {
    user.require_any(&[RoleGroup::BillingExecutive, RoleGroup::DispatchExecutive])?;
    Ok(Json(BillingService::new(state.db.clone()).get_request(id).await?))
}

pub async fn create_request(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateBillingRequestInput>,
) -> AppResult<(StatusCode, Json<BillingRequest>)> {
    user.require(RoleGroup::DispatchExecutive)?;
    let request = BillingService::new(state.db.clone())
        .create_request(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

// ---- Delivery challans ----

pub async fn list_challans(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<BillingFilter>,
) -> AppResult<Json<Vec<DeliveryChallan>>> {
    user.require_any(&[RoleGroup::BillingExecutive, RoleGroup::DispatchExecutive])?;
    Ok(Json(BillingService::new(state.db.clone()).list_challans(filter).await?))
}

pub async fn get_challan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DeliveryChallan>> {
    user.require_any(&[RoleGroup::BillingExecutive, RoleGroup::DispatchExecutive])?;
    Ok(Json(BillingService::new(state.db.clone()).get_challan(id).await?))
}

pub async fn create_challan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateChallanInput>,
) -> AppResult<(StatusCode, Json<DeliveryChallan>)> {
    user.require(RoleGroup::BillingExecutive)?;
    let challan = BillingService::new(state.db.clone())
        .create_challan(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(challan)))
}

pub async fn update_challan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateChallanInput>,
) -> AppResult<Json<DeliveryChallan>> {
    user.require(RoleGroup::BillingExecutive)?;
    Ok(Json(BillingService::new(state.db.clone()).update_challan(id, input).await?))
}

pub async fn approve_challan(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DeliveryChallan>> {
    user.require(RoleGroup::BillingExecutive)?;
    let challan = BillingService::new(state.db.clone())
        .approve_challan(user.user_id, id)
        .await?;
    Ok(Json(challan))
}

// ---- Tax invoices ----

pub async fn list_invoices(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<BillingFilter>,
) -> AppResult<Json<Vec<TaxInvoice>>> {
    user.require_any(&[RoleGroup::BillingExecutive, RoleGroup::AccountsUser])?;
    Ok(Json(BillingService::new(state.db.clone()).list_invoices(filter).await?))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TaxInvoice>> {
    user.require_any(&[RoleGroup::BillingExecutive, RoleGroup::AccountsUser])?;
    Ok(Json(BillingService::new(state.db.clone()).get_invoice(id).await?))
}

pub async fn create_invoice(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateInvoiceInput>,
) -> AppResult<(StatusCode, Json<TaxInvoice>)> {
    user.require(RoleGroup::BillingExecutive)?;
    let invoice = BillingService::new(state.db.clone())
        .create_invoice(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(invoice)))
}

pub async fn update_invoice(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateInvoiceInput>,
) -> AppResult<Json<TaxInvoice>> {
    user.require(RoleGroup::BillingExecutive)?;
    Ok(Json(BillingService::new(state.db.clone()).update_invoice(id, input).await?))
}

/// Only finance head (or admin) may push an invoice past the party's credit limit
pub async fn approve_invoice(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ApproveInvoiceInput>,
) -> AppResult<Json<TaxInvoice>> {
    user.require(RoleGroup::AccountsManager)?;
    let may_override = user.is_in(RoleGroup::FinanceHead);
    let invoice = BillingService::new(state.db.clone())
        .approve_invoice(user.user_id, id, input, may_override)
        .await?;
    Ok(Json(invoice))
}

pub async fn send_to_dispatch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<TaxInvoice>> {
    user.require(RoleGroup::BillingExecutive)?;
    Ok(Json(BillingService::new(state.db.clone()).send_to_dispatch(id).await?))
}

pub async fn billing_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<BillingDashboard>> {
    user.require_any(&[RoleGroup::BillingExecutive, RoleGroup::AccountsUser])?;
    Ok(Json(BillingService::new(state.db.clone()).dashboard().await?))
}

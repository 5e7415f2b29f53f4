//! Accounts handlers: payment receipts, allocation, receivables and reconciliation

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use shared::RoleGroup;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::accounts::{
    AccountsDashboard, AllocateInput, AllocationResult, CreateReceiptInput,
    CreateReconciliationInput, PartyAging, PaymentAllocation, PaymentReceipt, ReceiptFilter,
    ReceiptStatusInput, Receivable, ReceivableFilter, Reconciliation,
};
use crate::services::AccountsService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReconciliationQuery {
    pub party_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RefreshResult {
    pub refreshed: usize,
}

const READERS: &[RoleGroup] = &[RoleGroup::AccountsUser, RoleGroup::Auditor];

// ---- Receipts ----

pub async fn list_receipts(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<ReceiptFilter>,
) -> AppResult<Json<Vec<PaymentReceipt>>> {
    user.require_any(READERS)?;
    Ok(Json(AccountsService::new(state.db.clone()).list_receipts(filter).await?))
}

pub async fn get_receipt(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PaymentReceipt>> {
    user.require_any(READERS)?;
    Ok(Json(AccountsService::new(state.db.clone()).get_receipt(id).await?))
}

pub async fn create_receipt(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateReceiptInput>,
) -> AppResult<(StatusCode, Json<PaymentReceipt>)> {
    user.require(RoleGroup::AccountsUser)?;
    let receipt = AccountsService::new(state.db.clone())
        .create_receipt(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn update_receipt_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ReceiptStatusInput>,
) -> AppResult<Json<PaymentReceipt>> {
    user.require(RoleGroup::AccountsUser)?;
    let receipt = AccountsService::new(state.db.clone())
        .update_receipt_status(id, input)
        .await?;
    Ok(Json(receipt))
}

pub async fn list_allocations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<PaymentAllocation>>> {
    user.require_any(READERS)?;
    Ok(Json(AccountsService::new(state.db.clone()).list_allocations(id).await?))
}

pub async fn allocate_payment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<AllocateInput>,
) -> AppResult<(StatusCode, Json<AllocationResult>)> {
    user.require(RoleGroup::AccountsManager)?;
    let result = AccountsService::new(state.db.clone())
        .allocate(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(result)))
}

// ---- Receivables ----

pub async fn list_receivables(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<ReceivableFilter>,
) -> AppResult<Json<Vec<Receivable>>> {
    user.require_any(READERS)?;
    Ok(Json(AccountsService::new(state.db.clone()).list_receivables(filter).await?))
}

pub async fn refresh_receivables(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<RefreshResult>> {
    user.require(RoleGroup::AccountsManager)?;
    let refreshed = AccountsService::new(state.db.clone()).refresh_receivables().await?;
    Ok(Json(RefreshResult { refreshed }))
}

// ---- Reconciliation ----

pub async fn list_reconciliations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ReconciliationQuery>,
) -> AppResult<Json<Vec<Reconciliation>>> {
    user.require_any(READERS)?;
    let reconciliations = AccountsService::new(state.db.clone())
        .list_reconciliations(query.party_id)
        .await?;
    Ok(Json(reconciliations))
}

pub async fn get_reconciliation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Reconciliation>> {
    user.require_any(READERS)?;
    Ok(Json(AccountsService::new(state.db.clone()).get_reconciliation(id).await?))
}

pub async fn create_reconciliation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateReconciliationInput>,
) -> AppResult<(StatusCode, Json<Reconciliation>)> {
    user.require(RoleGroup::AccountsUser)?;
    let reconciliation = AccountsService::new(state.db.clone())
        .create_reconciliation(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(reconciliation)))
}

pub async fn approve_reconciliation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Reconciliation>> {
    user.require(RoleGroup::AccountsManager)?;
    let reconciliation = AccountsService::new(state.db.clone())
        .approve_reconciliation(user.user_id, id)
        .await?;
    Ok(Json(reconciliation))
}

// ---- Reports ----

pub async fn aging_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<PartyAging>>> {
    user.require_any(READERS)?;
    Ok(Json(AccountsService::new(state.db.clone()).aging_by_party().await?))
}

/// Aging report as a CSV download
pub async fn aging_csv(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    user.require_any(READERS)?;
    let csv = AccountsService::new(state.db.clone()).aging_csv().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"aging.csv\""),
        ],
        csv,
    )
        .into_response())
}

pub async fn accounts_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<AccountsDashboard>> {
    user.require_any(READERS)?;
    Ok(Json(AccountsService::new(state.db.clone()).dashboard().await?))
}

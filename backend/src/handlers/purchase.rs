//! Purchase handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::RoleGroup;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::purchase::{
    BillStatusInput, CreateBillInput, CreateGrnInput, CreatePurchaseOrderInput,
    CreateRequisitionInput, CreateReturnInput, CreateVendorInput, GoodsReceiptNote,
    PurchaseDashboard, PurchaseOrder, PurchaseOrderFilter, PurchaseRequisition, PurchaseReturn,
    PurchaseStatusFilter, RejectRequisitionInput, UpdateRequisitionInput, UpdateVendorInput, Vendor,
    VendorBill, VendorFilter,
};
use crate::services::PurchaseService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct GrnQuery {
    pub purchase_order_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct ReturnQuery {
    pub grn_id: Option<Uuid>,
}

fn purchase(state: &AppState) -> PurchaseService {
    PurchaseService::new(state.db.clone())
}

// ---- Vendors ----

pub async fn list_vendors(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<VendorFilter>,
) -> AppResult<Json<Vec<Vendor>>> {
    user.require(RoleGroup::PurchaseUser)?;
    Ok(Json(purchase(&state).list_vendors(filter).await?))
}

pub async fn get_vendor(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vendor>> {
    user.require(RoleGroup::PurchaseUser)?;
    Ok(Json(purchase(&state).get_vendor(id).await?))
}

pub async fn create_vendor(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateVendorInput>,
) -> AppResult<(StatusCode, Json<Vendor>)> {
    user.require(RoleGroup::PurchaseExecutive)?;
    let vendor = purchase(&state).create_vendor(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(vendor)))
}

pub async fn update_vendor(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateVendorInput>,
) -> AppResult<Json<Vendor>> {
    user.require(RoleGroup::PurchaseExecutive)?;
    Ok(Json(purchase(&state).update_vendor(id, input).await?))
}

pub async fn delete_vendor(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(RoleGroup::PurchaseManager)?;
    purchase(&state).delete_vendor(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Requisitions ----

pub async fn list_requisitions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<PurchaseStatusFilter>,
) -> AppResult<Json<Vec<PurchaseRequisition>>> {
    user.require_any(&[RoleGroup::PurchaseUser, RoleGroup::ProductionAccess])?;
    Ok(Json(purchase(&state).list_requisitions(filter).await?))
}

pub async fn get_requisition(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchaseRequisition>> {
    user.require_any(&[RoleGroup::PurchaseUser, RoleGroup::ProductionAccess])?;
    Ok(Json(purchase(&state).get_requisition(id).await?))
}

/// Production staff raise requisitions as well as purchase staff
pub async fn create_requisition(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateRequisitionInput>,
) -> AppResult<(StatusCode, Json<PurchaseRequisition>)> {
    user.require_any(&[RoleGroup::PurchaseUser, RoleGroup::ProductionAccess])?;
    let requisition = purchase(&state).create_requisition(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(requisition)))
}

pub async fn update_requisition(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateRequisitionInput>,
) -> AppResult<Json<PurchaseRequisition>> {
    user.require_any(&[RoleGroup::PurchaseUser, RoleGroup::ProductionAccess])?;
    Ok(Json(purchase(&state).update_requisition(id, input).await?))
}

pub async fn submit_requisition(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchaseRequisition>> {
    user.require_any(&[RoleGroup::PurchaseUser, RoleGroup::ProductionAccess])?;
    Ok(Json(purchase(&state).submit_requisition(id).await?))
}

pub async fn approve_requisition(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchaseRequisition>> {
    user.require(RoleGroup::PurchaseManager)?;
    Ok(Json(purchase(&state).approve_requisition(user.user_id, id).await?))
}

pub async fn reject_requisition(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<RejectRequisitionInput>,
) -> AppResult<Json<PurchaseRequisition>> {
    user.require(RoleGroup::PurchaseManager)?;
    Ok(Json(purchase(&state).reject_requisition(id, input).await?))
}

// ---- Purchase orders ----

pub async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<PurchaseOrderFilter>,
) -> AppResult<Json<Vec<PurchaseOrder>>> {
    user.require(RoleGroup::PurchaseUser)?;
    Ok(Json(purchase(&state).list_orders(filter).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrder>> {
    user.require(RoleGroup::PurchaseUser)?;
    Ok(Json(purchase(&state).get_order(id).await?))
}

pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreatePurchaseOrderInput>,
) -> AppResult<(StatusCode, Json<PurchaseOrder>)> {
    user.require(RoleGroup::PurchaseExecutive)?;
    let order = purchase(&state).create_order(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

pub async fn approve_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrder>> {
    user.require(RoleGroup::PurchaseManager)?;
    Ok(Json(purchase(&state).approve_order(user.user_id, id).await?))
}

pub async fn send_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<PurchaseOrder>> {
    user.require(RoleGroup::PurchaseExecutive)?;
    Ok(Json(purchase(&state).send_order_to_vendor(id).await?))
}

// ---- Goods receipts ----

pub async fn list_grns(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<GrnQuery>,
) -> AppResult<Json<Vec<GoodsReceiptNote>>> {
    user.require_any(&[RoleGroup::PurchaseUser, RoleGroup::StoreIncharge])?;
    Ok(Json(purchase(&state).list_grns(query.purchase_order_id).await?))
}

pub async fn get_grn(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<GoodsReceiptNote>> {
    user.require_any(&[RoleGroup::PurchaseUser, RoleGroup::StoreIncharge])?;
    Ok(Json(purchase(&state).get_grn(id).await?))
}

pub async fn create_grn(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateGrnInput>,
) -> AppResult<(StatusCode, Json<GoodsReceiptNote>)> {
    user.require_any(&[RoleGroup::StoreIncharge, RoleGroup::PurchaseUser])?;
    let grn = purchase(&state).create_grn(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(grn)))
}

pub async fn approve_grn(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<GoodsReceiptNote>> {
    user.require(RoleGroup::PurchaseManager)?;
    Ok(Json(purchase(&state).approve_grn(user.user_id, id).await?))
}

pub async fn reject_grn(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<GoodsReceiptNote>> {
    user.require(RoleGroup::PurchaseManager)?;
    Ok(Json(purchase(&state).reject_grn(user.user_id, id).await?))
}

// ---- Returns ----

pub async fn list_returns(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ReturnQuery>,
) -> AppResult<Json<Vec<PurchaseReturn>>> {
    user.require_any(&[RoleGroup::PurchaseUser, RoleGroup::StoreIncharge])?;
    Ok(Json(purchase(&state).list_returns(query.grn_id).await?))
}

pub async fn create_return(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateReturnInput>,
) -> AppResult<(StatusCode, Json<PurchaseReturn>)> {
    user.require_any(&[RoleGroup::StoreIncharge, RoleGroup::PurchaseUser])?;
    let purchase_return = purchase(&state).create_return(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(purchase_return)))
}

// ---- Vendor bills ----

pub async fn list_bills(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<PurchaseStatusFilter>,
) -> AppResult<Json<Vec<VendorBill>>> {
    user.require_any(&[RoleGroup::PurchaseUser, RoleGroup::AccountsUser])?;
    Ok(Json(purchase(&state).list_bills(filter).await?))
}

pub async fn get_bill(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<VendorBill>> {
    user.require_any(&[RoleGroup::PurchaseUser, RoleGroup::AccountsUser])?;
    Ok(Json(purchase(&state).get_bill(id).await?))
}

pub async fn create_bill(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateBillInput>,
) -> AppResult<(StatusCode, Json<VendorBill>)> {
    user.require_any(&[RoleGroup::PurchaseUser, RoleGroup::AccountsUser])?;
    let bill = purchase(&state).create_bill(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(bill)))
}

pub async fn update_bill_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<BillStatusInput>,
) -> AppResult<Json<VendorBill>> {
    user.require_any(&[RoleGroup::PurchaseManager, RoleGroup::AccountsManager])?;
    Ok(Json(purchase(&state).update_bill_status(user.user_id, id, input).await?))
}

pub async fn purchase_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<PurchaseDashboard>> {
    user.require(RoleGroup::PurchaseUser)?;
    Ok(Json(purchase(&state).dashboard().await?))
}

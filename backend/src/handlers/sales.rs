//! Sales handlers: leads, site projects, quotations, orders, measurement
//! requests and follow-ups

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
use crate::services::sales::{
    ConvertLeadInput, CreateFollowUpInput, CreateLeadInput, CreateQuotationInput,
    CreateSalesOrderInput, CreatedSalesOrder, FollowUp, FollowUpFilter, Lead, MeasurementRequest,
    Quotation, SalesDashboard, SalesOrder, SalesOrderStatusInput, SiteProject, SiteProjectInput,
    StatusFilter, UpdateFollowUpInput, UpdateLeadInput, UpdateMeasurementRequestInput,
    UpdateQuotationInput, UpdateSalesOrderInput,
};
use crate::services::SalesService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct PartyQuery {
    pub party_id: Option<Uuid>,
}

// ---- Leads ----

pub async fn list_leads(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<StatusFilter>,
) -> AppResult<Json<Vec<Lead>>> {
    user.require(RoleGroup::SalesUser)?;
    Ok(Json(SalesService::new(state.db.clone()).list_leads(filter).await?))
}

pub async fn get_lead(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Lead>> {
    user.require(RoleGroup::SalesUser)?;
    Ok(Json(SalesService::new(state.db.clone()).get_lead(id).await?))
}

pub async fn create_lead(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateLeadInput>,
) -> AppResult<(StatusCode, Json<Lead>)> {
    user.require(RoleGroup::SalesExecutive)?;
    let lead = SalesService::new(state.db.clone())
        .create_lead(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn update_lead(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateLeadInput>,
) -> AppResult<Json<Lead>> {
    user.require(RoleGroup::SalesExecutive)?;
    Ok(Json(SalesService::new(state.db.clone()).update_lead(id, input).await?))
}

pub async fn delete_lead(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(RoleGroup::SalesManager)?;
    SalesService::new(state.db.clone()).delete_lead(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn convert_lead(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ConvertLeadInput>,
) -> AppResult<Json<Lead>> {
    user.require(RoleGroup::SalesExecutive)?;
    Ok(Json(SalesService::new(state.db.clone()).convert_lead(id, input).await?))
}

// ---- Site projects ----

pub async fn list_projects(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(query): Query<PartyQuery>,
) -> AppResult<Json<Vec<SiteProject>>> {
    let projects = SalesService::new(state.db.clone())
        .list_projects(query.party_id)
        .await?;
    Ok(Json(projects))
}

pub async fn get_project(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SiteProject>> {
    Ok(Json(SalesService::new(state.db.clone()).get_project(id).await?))
}

pub async fn create_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<SiteProjectInput>,
) -> AppResult<(StatusCode, Json<SiteProject>)> {
    user.require(RoleGroup::SalesUser)?;
    let project = SalesService::new(state.db.clone())
        .create_project(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(project)))
}

pub async fn update_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<SiteProjectInput>,
) -> AppResult<Json<SiteProject>> {
    user.require(RoleGroup::SalesUser)?;
    Ok(Json(SalesService::new(state.db.clone()).update_project(id, input).await?))
}

pub async fn delete_project(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(RoleGroup::SalesManager)?;
    SalesService::new(state.db.clone()).delete_project(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Quotations ----

pub async fn list_quotations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<StatusFilter>,
) -> AppResult<Json<Vec<Quotation>>> {
    user.require(RoleGroup::SalesUser)?;
    Ok(Json(SalesService::new(state.db.clone()).list_quotations(filter).await?))
}

pub async fn get_quotation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Quotation>> {
    user.require(RoleGroup::SalesUser)?;
    Ok(Json(SalesService::new(state.db.clone()).get_quotation(id).await?))
}

pub async fn create_quotation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateQuotationInput>,
) -> AppResult<(StatusCode, Json<Quotation>)> {
    user.require(RoleGroup::SalesExecutive)?;
    let quotation = SalesService::new(state.db.clone())
        .create_quotation(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(quotation)))
}

pub async fn update_quotation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateQuotationInput>,
) -> AppResult<Json<Quotation>> {
    user.require(RoleGroup::SalesExecutive)?;
    Ok(Json(SalesService::new(state.db.clone()).update_quotation(id, input).await?))
}

pub async fn delete_quotation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(RoleGroup::SalesManager)?;
    SalesService::new(state.db.clone()).delete_quotation(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn approve_discount(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Quotation>> {
    user.require(RoleGroup::SalesManager)?;
    let quotation = SalesService::new(state.db.clone())
        .approve_discount(user.user_id, id)
        .await?;
    Ok(Json(quotation))
}

// ---- Sales orders ----

pub async fn list_orders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<StatusFilter>,
) -> AppResult<Json<Vec<SalesOrder>>> {
    user.require_any(&[RoleGroup::SalesUser, RoleGroup::ProductionAccess])?;
    Ok(Json(SalesService::new(state.db.clone()).list_orders(filter).await?))
}

pub async fn get_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<SalesOrder>> {
    user.require_any(&[RoleGroup::SalesUser, RoleGroup::ProductionAccess])?;
    Ok(Json(SalesService::new(state.db.clone()).get_order(id).await?))
}

/// Book an order; its measurement request comes back with it
pub async fn create_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateSalesOrderInput>,
) -> AppResult<(StatusCode, Json<CreatedSalesOrder>)> {
    user.require(RoleGroup::SalesExecutive)?;
    let created = SalesService::new(state.db.clone())
        .create_order(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_order(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSalesOrderInput>,
) -> AppResult<Json<SalesOrder>> {
    user.require(RoleGroup::SalesExecutive)?;
    Ok(Json(SalesService::new(state.db.clone()).update_order(id, input).await?))
}

pub async fn update_order_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<SalesOrderStatusInput>,
) -> AppResult<Json<SalesOrder>> {
    user.require_any(&[RoleGroup::SalesUser, RoleGroup::ProductionManager])?;
    let order = SalesService::new(state.db.clone())
        .update_order_status(id, input.status)
        .await?;
    Ok(Json(order))
}

// ---- Measurement requests ----

pub async fn list_measurement_requests(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(filter): Query<StatusFilter>,
) -> AppResult<Json<Vec<MeasurementRequest>>> {
    let requests = SalesService::new(state.db.clone())
        .list_measurement_requests(filter)
        .await?;
    Ok(Json(requests))
}

pub async fn get_measurement_request(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<MeasurementRequest>> {
    let request = SalesService::new(state.db.clone())
        .get_measurement_request(id)
        .await?;
    Ok(Json(request))
}

pub async fn update_measurement_request(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateMeasurementRequestInput>,
) -> AppResult<Json<MeasurementRequest>> {
    user.require_any(&[
        RoleGroup::SalesUser,
        RoleGroup::MeasurementTaskAssigner,
        RoleGroup::MeasurementCaptain,
    ])?;
    let request = SalesService::new(state.db.clone())
        .update_measurement_request(id, input)
        .await?;
    Ok(Json(request))
}

// ---- Follow-ups ----

pub async fn list_follow_ups(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<FollowUpFilter>,
) -> AppResult<Json<Vec<FollowUp>>> {
    user.require(RoleGroup::SalesUser)?;
    Ok(Json(SalesService::new(state.db.clone()).list_follow_ups(filter).await?))
}

pub async fn create_follow_up(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateFollowUpInput>,
) -> AppResult<(StatusCode, Json<FollowUp>)> {
    user.require(RoleGroup::SalesUser)?;
    let follow_up = SalesService::new(state.db.clone())
        .create_follow_up(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(follow_up)))
}

pub async fn update_follow_up(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateFollowUpInput>,
) -> AppResult<Json<FollowUp>> {
    user.require(RoleGroup::SalesUser)?;
    Ok(Json(SalesService::new(state.db.clone()).update_follow_up(id, input).await?))
}

pub async fn delete_follow_up(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(RoleGroup::SalesUser)?;
    SalesService::new(state.db.clone()).delete_follow_up(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn sales_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<SalesDashboard>> {
    user.require(RoleGroup::SalesUser)?;
    Ok(Json(SalesService::new(state.db.clone()).dashboard().await?))
}

//! Logistics handlers: fleet, drivers, vehicle assignments and delivery issues

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
use crate::services::logistics::{
    AssignVehicleInput, CreateDriverInput, CreateVehicleInput, DeliveryIssue, Driver, IssueFilter,
    LogisticsSummary, ReportIssueInput, UpdateAssignmentInput, UpdateDriverInput, UpdateIssueInput,
    UpdateVehicleInput, Vehicle, VehicleAssignment, VehicleFilter,
};
use crate::services::LogisticsService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AssignmentQuery {
    pub status: Option<String>,
}

fn logistics(state: &AppState) -> LogisticsService {
    LogisticsService::new(state.db.clone())
}

// ---- Vehicles ----

pub async fn list_vehicles(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<VehicleFilter>,
) -> AppResult<Json<Vec<Vehicle>>> {
    user.require_any(&[RoleGroup::LogisticsUser, RoleGroup::DispatchExecutive])?;
    Ok(Json(logistics(&state).list_vehicles(filter).await?))
}

pub async fn get_vehicle(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vehicle>> {
    user.require_any(&[RoleGroup::LogisticsUser, RoleGroup::DispatchExecutive])?;
    Ok(Json(logistics(&state).get_vehicle(id).await?))
}

pub async fn create_vehicle(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateVehicleInput>,
) -> AppResult<(StatusCode, Json<Vehicle>)> {
    user.require(RoleGroup::LogisticsManager)?;
    let vehicle = logistics(&state).create_vehicle(input).await?;
    Ok((StatusCode::CREATED, Json(vehicle)))
}

pub async fn update_vehicle(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateVehicleInput>,
) -> AppResult<Json<Vehicle>> {
    user.require(RoleGroup::LogisticsManager)?;
    Ok(Json(logistics(&state).update_vehicle(id, input).await?))
}

pub async fn delete_vehicle(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(RoleGroup::LogisticsManager)?;
    logistics(&state).delete_vehicle(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Drivers ----

pub async fn list_drivers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<Driver>>> {
    user.require_any(&[RoleGroup::LogisticsUser, RoleGroup::DispatchExecutive])?;
    Ok(Json(logistics(&state).list_drivers().await?))
}

pub async fn get_driver(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Driver>> {
    user.require_any(&[RoleGroup::LogisticsUser, RoleGroup::DispatchExecutive])?;
    Ok(Json(logistics(&state).get_driver(id).await?))
}

pub async fn create_driver(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateDriverInput>,
) -> AppResult<(StatusCode, Json<Driver>)> {
    user.require(RoleGroup::LogisticsManager)?;
    let driver = logistics(&state).create_driver(input).await?;
    Ok((StatusCode::CREATED, Json(driver)))
}

pub async fn update_driver(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateDriverInput>,
) -> AppResult<Json<Driver>> {
    user.require(RoleGroup::LogisticsManager)?;
    Ok(Json(logistics(&state).update_driver(id, input).await?))
}

pub async fn delete_driver(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(RoleGroup::LogisticsManager)?;
    logistics(&state).delete_driver(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Assignments ----

pub async fn list_assignments(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<AssignmentQuery>,
) -> AppResult<Json<Vec<VehicleAssignment>>> {
    user.require(RoleGroup::LogisticsUser)?;
    Ok(Json(logistics(&state).list_assignments(query.status).await?))
}

pub async fn get_assignment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<VehicleAssignment>> {
    user.require(RoleGroup::LogisticsUser)?;
    Ok(Json(logistics(&state).get_assignment(id).await?))
}

pub async fn assign_vehicle(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<AssignVehicleInput>,
) -> AppResult<(StatusCode, Json<VehicleAssignment>)> {
    user.require(RoleGroup::LogisticsManager)?;
    let assignment = logistics(&state).assign_vehicle(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// Drivers move their own trips along; managers can move any
pub async fn update_assignment(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateAssignmentInput>,
) -> AppResult<Json<VehicleAssignment>> {
    user.require_any(&[RoleGroup::LogisticsManager, RoleGroup::Driver])?;
    let assignment = logistics(&state)
        .update_assignment(user.user_id, id, input)
        .await?;
    Ok(Json(assignment))
}

// ---- Delivery issues ----

pub async fn list_issues(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<IssueFilter>,
) -> AppResult<Json<Vec<DeliveryIssue>>> {
    user.require_any(&[RoleGroup::LogisticsUser, RoleGroup::DispatchExecutive])?;
    Ok(Json(logistics(&state).list_issues(filter).await?))
}

pub async fn report_issue(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<ReportIssueInput>,
) -> AppResult<(StatusCode, Json<DeliveryIssue>)> {
    user.require(RoleGroup::LogisticsUser)?;
    let issue = logistics(&state).report_issue(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

pub async fn update_issue(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateIssueInput>,
) -> AppResult<Json<DeliveryIssue>> {
    user.require(RoleGroup::LogisticsManager)?;
    Ok(Json(logistics(&state).update_issue(id, input).await?))
}

pub async fn logistics_summary(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<LogisticsSummary>> {
    user.require(RoleGroup::LogisticsUser)?;
    Ok(Json(logistics(&state).summary().await?))
}

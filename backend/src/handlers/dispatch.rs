//! Dispatch handlers: dispatches, gate passes and delivery tracking

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use shared::RoleGroup;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::dispatch::{
    CreateDispatchInput, DeliveryTracking, Dispatch, DispatchDashboard, DispatchFilter, GatePass,
    UpdateDispatchInput, UpdateTrackingInput,
};
use crate::services::production::ProductionPaper;
use crate::services::DispatchService;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ApprovedDispatch {
    pub dispatch: Dispatch,
    pub gate_pass: GatePass,
}

pub async fn list_dispatches(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<DispatchFilter>,
) -> AppResult<Json<Vec<Dispatch>>> {
    user.require_any(&[RoleGroup::DispatchExecutive, RoleGroup::LogisticsUser])?;
    Ok(Json(DispatchService::new(state.db.clone()).list_dispatches(filter).await?))
}

pub async fn get_dispatch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Dispatch>> {
    user.require_any(&[RoleGroup::DispatchExecutive, RoleGroup::LogisticsUser])?;
    Ok(Json(DispatchService::new(state.db.clone()).get_dispatch(id).await?))
}

pub async fn create_dispatch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateDispatchInput>,
) -> AppResult<(StatusCode, Json<Dispatch>)> {
    user.require(RoleGroup::DispatchExecutive)?;
    let dispatch = DispatchService::new(state.db.clone())
        .create_dispatch(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(dispatch)))
}

pub async fn update_dispatch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateDispatchInput>,
) -> AppResult<Json<Dispatch>> {
    user.require(RoleGroup::DispatchExecutive)?;
    Ok(Json(DispatchService::new(state.db.clone()).update_dispatch(id, input).await?))
}

/// Approve a dispatch and issue its gate pass
pub async fn approve_dispatch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApprovedDispatch>> {
    user.require(RoleGroup::DispatchSupervisor)?;
    let (dispatch, gate_pass) = DispatchService::new(state.db.clone())
        .approve_dispatch(user.user_id, id)
        .await?;
    Ok(Json(ApprovedDispatch { dispatch, gate_pass }))
}

pub async fn mark_dispatched(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Dispatch>> {
    user.require_any(&[RoleGroup::DispatchExecutive, RoleGroup::DispatchSupervisor])?;
    let dispatch = DispatchService::new(state.db.clone())
        .mark_dispatched(user.user_id, id)
        .await?;
    Ok(Json(dispatch))
}

pub async fn get_gate_pass(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(number): Path<String>,
) -> AppResult<Json<GatePass>> {
    Ok(Json(DispatchService::new(state.db.clone()).get_gate_pass(&number).await?))
}

pub async fn verify_gate_pass(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(number): Path<String>,
) -> AppResult<Json<GatePass>> {
    let gate_pass = DispatchService::new(state.db.clone())
        .verify_gate_pass(user.user_id, &number)
        .await?;
    Ok(Json(gate_pass))
}

pub async fn get_tracking(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<DeliveryTracking>> {
    user.require_any(&[RoleGroup::DispatchExecutive, RoleGroup::LogisticsUser])?;
    Ok(Json(DispatchService::new(state.db.clone()).get_tracking(id).await?))
}

pub async fn update_tracking(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateTrackingInput>,
) -> AppResult<Json<DeliveryTracking>> {
    user.require(RoleGroup::LogisticsManager)?;
    let tracking = DispatchService::new(state.db.clone())
        .update_tracking(user.user_id, id, input)
        .await?;
    Ok(Json(tracking))
}

pub async fn ready_for_dispatch(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<ProductionPaper>>> {
    user.require(RoleGroup::DispatchExecutive)?;
    Ok(Json(DispatchService::new(state.db.clone()).ready_for_dispatch().await?))
}

pub async fn dispatch_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<DispatchDashboard>> {
    user.require_any(&[RoleGroup::DispatchExecutive, RoleGroup::LogisticsUser])?;
    Ok(Json(DispatchService::new(state.db.clone()).dashboard().await?))
}

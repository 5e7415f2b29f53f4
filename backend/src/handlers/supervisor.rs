//! Production supervisor handlers
//!
//! Every route works on the caller's own supervisor profile.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use shared::RoleGroup;
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::scheduling::ProductionTask;
use crate::services::supervisor::{
    CreateIssueInput, ProductionIssue, ProgressInput, ReasonInput, SupervisorDashboard, TaskFilter,
    TaskProgress, UpdateIssueInput,
};
use crate::services::SupervisorService;
use crate::AppState;

pub async fn list_tasks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<TaskFilter>,
) -> AppResult<Json<Vec<ProductionTask>>> {
    user.require(RoleGroup::ProductionSupervisor)?;
    let tasks = SupervisorService::new(state.db.clone())
        .list_tasks(user.user_id, filter)
        .await?;
    Ok(Json(tasks))
}

pub async fn get_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<ProductionTask>> {
    user.require(RoleGroup::ProductionSupervisor)?;
    let task = SupervisorService::new(state.db.clone())
        .get_task(user.user_id, task_id)
        .await?;
    Ok(Json(task))
}

pub async fn accept_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<ProductionTask>> {
    user.require(RoleGroup::ProductionSupervisor)?;
    let task = SupervisorService::new(state.db.clone())
        .accept_task(user.user_id, task_id)
        .await?;
    Ok(Json(task))
}

pub async fn reject_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<Uuid>,
    Json(input): Json<ReasonInput>,
) -> AppResult<Json<ProductionTask>> {
    user.require(RoleGroup::ProductionSupervisor)?;
    let task = SupervisorService::new(state.db.clone())
        .reject_task(user.user_id, task_id, input)
        .await?;
    Ok(Json(task))
}

pub async fn pause_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<Uuid>,
    Json(input): Json<ReasonInput>,
) -> AppResult<Json<ProductionTask>> {
    user.require(RoleGroup::ProductionSupervisor)?;
    let task = SupervisorService::new(state.db.clone())
        .pause_task(user.user_id, task_id, input)
        .await?;
    Ok(Json(task))
}

pub async fn resume_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<ProductionTask>> {
    user.require(RoleGroup::ProductionSupervisor)?;
    let task = SupervisorService::new(state.db.clone())
        .resume_task(user.user_id, task_id)
        .await?;
    Ok(Json(task))
}

pub async fn complete_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<ProductionTask>> {
    user.require(RoleGroup::ProductionSupervisor)?;
    let task = SupervisorService::new(state.db.clone())
        .complete_task(user.user_id, task_id)
        .await?;
    Ok(Json(task))
}

pub async fn record_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<Uuid>,
    Json(input): Json<ProgressInput>,
) -> AppResult<Json<ProductionTask>> {
    user.require(RoleGroup::ProductionSupervisor)?;
    let task = SupervisorService::new(state.db.clone())
        .record_progress(user.user_id, task_id, input)
        .await?;
    Ok(Json(task))
}

pub async fn task_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(task_id): Path<Uuid>,
) -> AppResult<Json<Vec<TaskProgress>>> {
    user.require(RoleGroup::ProductionSupervisor)?;
    let progress = SupervisorService::new(state.db.clone())
        .task_progress(user.user_id, task_id)
        .await?;
    Ok(Json(progress))
}

pub async fn list_issues(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<ProductionIssue>>> {
    user.require(RoleGroup::ProductionSupervisor)?;
    Ok(Json(SupervisorService::new(state.db.clone()).list_issues(user.user_id).await?))
}

pub async fn report_issue(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateIssueInput>,
) -> AppResult<(StatusCode, Json<ProductionIssue>)> {
    user.require(RoleGroup::ProductionSupervisor)?;
    let issue = SupervisorService::new(state.db.clone())
        .report_issue(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

pub async fn update_issue(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateIssueInput>,
) -> AppResult<Json<ProductionIssue>> {
    user.require_any(&[RoleGroup::ProductionSupervisor, RoleGroup::ProductionManager])?;
    Ok(Json(SupervisorService::new(state.db.clone()).update_issue(id, input).await?))
}

pub async fn supervisor_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<SupervisorDashboard>> {
    user.require(RoleGroup::ProductionSupervisor)?;
    Ok(Json(SupervisorService::new(state.db.clone()).dashboard(user.user_id).await?))
}

//! Administration handlers: user accounts, departments and production supervisors

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{PaginatedResponse, Pagination, RoleGroup};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::departments::{
    CreateSupervisorInput, Department, DepartmentInput, Supervisor, UpdateSupervisorInput,
};
use crate::services::users::{CreateUserInput, UpdateUserInput, UserFilter, UserProfile};
use crate::services::{DepartmentService, UserService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DepartmentQuery {
    pub department_id: Option<Uuid>,
}

// ---- Users ----

pub async fn list_users(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<UserFilter>,
    Query(pagination): Query<Pagination>,
) -> AppResult<Json<PaginatedResponse<UserProfile>>> {
    user.require(RoleGroup::Admin)?;
    let users = UserService::new(state.db.clone())
        .list_users(filter, pagination)
        .await?;
    Ok(Json(users))
}

pub async fn get_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<UserProfile>> {
    user.require(RoleGroup::Admin)?;
    Ok(Json(UserService::new(state.db.clone()).get_user(user_id).await?))
}

pub async fn create_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateUserInput>,
) -> AppResult<(StatusCode, Json<UserProfile>)> {
    user.require(RoleGroup::Admin)?;
    let created = UserService::new(state.db.clone()).create_user(input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
    Json(input): Json<UpdateUserInput>,
) -> AppResult<Json<UserProfile>> {
    user.require(RoleGroup::Admin)?;
    let updated = UserService::new(state.db.clone())
        .update_user(user_id, input)
        .await?;
    Ok(Json(updated))
}

pub async fn delete_user(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(RoleGroup::Admin)?;
    UserService::new(state.db.clone())
        .delete_user(user.user_id, user_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Departments ----

pub async fn list_departments(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> AppResult<Json<Vec<Department>>> {
    Ok(Json(DepartmentService::new(state.db.clone()).list_departments().await?))
}

pub async fn get_department(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Department>> {
    Ok(Json(DepartmentService::new(state.db.clone()).get_department(id).await?))
}

pub async fn create_department(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<DepartmentInput>,
) -> AppResult<(StatusCode, Json<Department>)> {
    user.require(RoleGroup::Admin)?;
    let department = DepartmentService::new(state.db.clone())
        .create_department(input)
        .await?;
    Ok((StatusCode::CREATED, Json(department)))
}

pub async fn update_department(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<DepartmentInput>,
) -> AppResult<Json<Department>> {
    user.require(RoleGroup::Admin)?;
    let department = DepartmentService::new(state.db.clone())
        .update_department(id, input)
        .await?;
    Ok(Json(department))
}

pub async fn delete_department(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(RoleGroup::Admin)?;
    DepartmentService::new(state.db.clone()).delete_department(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Production supervisors ----

pub async fn list_supervisors(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<DepartmentQuery>,
) -> AppResult<Json<Vec<Supervisor>>> {
    user.require_any(&[RoleGroup::Admin, RoleGroup::ProductionManager, RoleGroup::ProductionScheduler])?;
    let supervisors = DepartmentService::new(state.db.clone())
        .list_supervisors(query.department_id)
        .await?;
    Ok(Json(supervisors))
}

pub async fn get_supervisor(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Supervisor>> {
    user.require_any(&[RoleGroup::Admin, RoleGroup::ProductionManager, RoleGroup::ProductionScheduler])?;
    Ok(Json(DepartmentService::new(state.db.clone()).get_supervisor(id).await?))
}

pub async fn create_supervisor(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateSupervisorInput>,
) -> AppResult<(StatusCode, Json<Supervisor>)> {
    user.require(RoleGroup::Admin)?;
    let supervisor = DepartmentService::new(state.db.clone())
        .create_supervisor(input)
        .await?;
    Ok((StatusCode::CREATED, Json(supervisor)))
}

pub async fn update_supervisor(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSupervisorInput>,
) -> AppResult<Json<Supervisor>> {
    user.require(RoleGroup::Admin)?;
    let supervisor = DepartmentService::new(state.db.clone())
        .update_supervisor(id, input)
        .await?;
    Ok(Json(supervisor))
}

pub async fn delete_supervisor(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(RoleGroup::Admin)?;
    DepartmentService::new(state.db.clone()).delete_supervisor(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

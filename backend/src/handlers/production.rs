//! Production handlers: measurements, measurement tasks, production papers,
//! tracking stages and schedules

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{Role, RoleGroup};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::production::{
    CreateMeasurementInput, CreateMeasurementTaskInput, CreatePaperInput, CreateStageInput,
    Measurement, MeasurementFilter, MeasurementTask, MeasurementTaskStatusInput, NextNumber,
    NextPaperNumberQuery, PaperFilter, PaperStatusInput, ProductionPaper, RawMaterialCheckInput,
    RejectInput, SoftDeleteInput, StageStatusInput, TrackingStage, UpdateMeasurementInput,
    UpdatePaperInput,
};
use crate::services::scheduling::{
    CreateScheduleInput, ProductionSchedule, ScheduleStatusInput, ScheduleWithTasks,
    UpdateScheduleInput,
};
use crate::services::users::SerialNumber;
use crate::services::{ProductionService, SchedulingService, UserService};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ScheduleQuery {
    pub status: Option<String>,
}

// ---- Measurements ----

pub async fn list_measurements(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<MeasurementFilter>,
) -> AppResult<Json<Vec<Measurement>>> {
    user.require(RoleGroup::ProductionAccess)?;
    let measurements = ProductionService::new(state.db.clone())
        .list_measurements(filter)
        .await?;
    Ok(Json(measurements))
}

pub async fn get_measurement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Measurement>> {
    user.require(RoleGroup::ProductionAccess)?;
    Ok(Json(ProductionService::new(state.db.clone()).get_measurement(id).await?))
}

pub async fn next_measurement_number(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<NextNumber>> {
    user.require(RoleGroup::ProductionAccess)?;
    let next = ProductionService::new(state.db.clone())
        .next_measurement_number()
        .await?;
    Ok(Json(next))
}

/// Hand the caller the next row serial for a measurement sheet
pub async fn next_serial_number(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<SerialNumber>> {
    user.require(RoleGroup::ProductionAccess)?;
    let serial = UserService::new(state.db.clone())
        .next_serial_number(user.user_id)
        .await?;
    Ok(Json(serial))
}

pub async fn create_measurement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateMeasurementInput>,
) -> AppResult<(StatusCode, Json<Measurement>)> {
    user.require(RoleGroup::ProductionAccess)?;
    let measurement = ProductionService::new(state.db.clone())
        .create_measurement(user.user_id, user.role, input)
        .await?;
    Ok((StatusCode::CREATED, Json(measurement)))
}

pub async fn update_measurement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateMeasurementInput>,
) -> AppResult<Json<Measurement>> {
    user.require(RoleGroup::ProductionAccess)?;
    let measurement = ProductionService::new(state.db.clone())
        .update_measurement(id, input)
        .await?;
    Ok(Json(measurement))
}

pub async fn approve_measurement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Measurement>> {
    user.require(RoleGroup::ProductionManager)?;
    let measurement = ProductionService::new(state.db.clone())
        .approve_measurement(user.user_id, id)
        .await?;
    Ok(Json(measurement))
}

pub async fn reject_measurement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<RejectInput>,
) -> AppResult<Json<Measurement>> {
    user.require(RoleGroup::ProductionManager)?;
    let measurement = ProductionService::new(state.db.clone())
        .reject_measurement(user.user_id, id, input)
        .await?;
    Ok(Json(measurement))
}

pub async fn delete_measurement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<SoftDeleteInput>,
) -> AppResult<Json<Measurement>> {
    user.require(RoleGroup::ProductionManager)?;
    let measurement = ProductionService::new(state.db.clone())
        .delete_measurement(id, input)
        .await?;
    Ok(Json(measurement))
}

pub async fn recover_measurement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Measurement>> {
    user.require(RoleGroup::ProductionManager)?;
    Ok(Json(ProductionService::new(state.db.clone()).recover_measurement(id).await?))
}

// ---- Measurement tasks ----

/// Captains see their own tasks; assigners see every task
pub async fn list_measurement_tasks(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<MeasurementTask>>> {
    user.require_any(&[RoleGroup::MeasurementTaskAssigner, RoleGroup::MeasurementCaptain])?;
    let assigned_to = (user.role == Role::MeasurementCaptain).then_some(user.user_id);
    let tasks = ProductionService::new(state.db.clone())
        .list_measurement_tasks(assigned_to)
        .await?;
    Ok(Json(tasks))
}

pub async fn create_measurement_task(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateMeasurementTaskInput>,
) -> AppResult<(StatusCode, Json<MeasurementTask>)> {
    user.require(RoleGroup::MeasurementTaskAssigner)?;
    let task = ProductionService::new(state.db.clone())
        .create_measurement_task(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_measurement_task_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<MeasurementTaskStatusInput>,
) -> AppResult<Json<MeasurementTask>> {
    user.require_any(&[RoleGroup::MeasurementTaskAssigner, RoleGroup::MeasurementCaptain])?;
    let task = ProductionService::new(state.db.clone())
        .update_measurement_task_status(id, input)
        .await?;
    Ok(Json(task))
}

// ---- Production papers ----

pub async fn list_papers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<PaperFilter>,
) -> AppResult<Json<Vec<ProductionPaper>>> {
    user.require_any(&[
        RoleGroup::ProductionAccess,
        RoleGroup::QualityChecker,
        RoleGroup::DispatchExecutive,
    ])?;
    Ok(Json(ProductionService::new(state.db.clone()).list_papers(filter).await?))
}

pub async fn get_paper(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProductionPaper>> {
    Ok(Json(ProductionService::new(state.db.clone()).get_paper(id).await?))
}

pub async fn next_paper_number(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<NextPaperNumberQuery>,
) -> AppResult<Json<NextNumber>> {
    user.require(RoleGroup::ProductionAccess)?;
    Ok(Json(ProductionService::new(state.db.clone()).next_paper_number(query).await?))
}

pub async fn create_paper(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreatePaperInput>,
) -> AppResult<(StatusCode, Json<ProductionPaper>)> {
    user.require(RoleGroup::ProductionAccess)?;
    let paper = ProductionService::new(state.db.clone())
        .create_paper(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(paper)))
}

pub async fn update_paper(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdatePaperInput>,
) -> AppResult<Json<ProductionPaper>> {
    user.require(RoleGroup::ProductionAccess)?;
    Ok(Json(ProductionService::new(state.db.clone()).update_paper(id, input).await?))
}

pub async fn update_paper_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<PaperStatusInput>,
) -> AppResult<Json<ProductionPaper>> {
    user.require_any(&[RoleGroup::ProductionManager, RoleGroup::ProductionScheduler])?;
    let paper = ProductionService::new(state.db.clone())
        .update_paper_status(id, input.status)
        .await?;
    Ok(Json(paper))
}

pub async fn delete_paper(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<SoftDeleteInput>,
) -> AppResult<Json<ProductionPaper>> {
    user.require(RoleGroup::ProductionManager)?;
    Ok(Json(ProductionService::new(state.db.clone()).delete_paper(id, input).await?))
}

pub async fn recover_paper(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ProductionPaper>> {
    user.require(RoleGroup::ProductionManager)?;
    Ok(Json(ProductionService::new(state.db.clone()).recover_paper(id).await?))
}

pub async fn record_raw_material_check(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<RawMaterialCheckInput>,
) -> AppResult<Json<ProductionPaper>> {
    user.require(RoleGroup::RawMaterialChecker)?;
    let paper = ProductionService::new(state.db.clone())
        .record_raw_material_check(user.user_id, id, input)
        .await?;
    Ok(Json(paper))
}

// ---- Tracking stages ----

pub async fn list_stages(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(paper_id): Path<Uuid>,
) -> AppResult<Json<Vec<TrackingStage>>> {
    Ok(Json(ProductionService::new(state.db.clone()).list_stages(paper_id).await?))
}

pub async fn add_stage(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(paper_id): Path<Uuid>,
    Json(input): Json<CreateStageInput>,
) -> AppResult<(StatusCode, Json<TrackingStage>)> {
    user.require_any(&[RoleGroup::ProductionManager, RoleGroup::ProductionScheduler])?;
    let stage = ProductionService::new(state.db.clone())
        .add_stage(user.user_id, paper_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(stage)))
}

pub async fn update_stage_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(stage_id): Path<Uuid>,
    Json(input): Json<StageStatusInput>,
) -> AppResult<Json<TrackingStage>> {
    user.require_any(&[
        RoleGroup::ProductionManager,
        RoleGroup::ProductionScheduler,
        RoleGroup::ProductionSupervisor,
    ])?;
    let stage = ProductionService::new(state.db.clone())
        .update_stage_status(user.user_id, stage_id, input)
        .await?;
    Ok(Json(stage))
}

// ---- Schedules ----

pub async fn list_schedules(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ScheduleQuery>,
) -> AppResult<Json<Vec<ProductionSchedule>>> {
    user.require_any(&[RoleGroup::ProductionManager, RoleGroup::ProductionScheduler])?;
    let schedules = SchedulingService::new(state.db.clone())
        .list_schedules(query.status)
        .await?;
    Ok(Json(schedules))
}

pub async fn get_schedule(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ScheduleWithTasks>> {
    user.require_any(&[RoleGroup::ProductionManager, RoleGroup::ProductionScheduler])?;
    Ok(Json(SchedulingService::new(state.db.clone()).get_schedule(id).await?))
}

/// Schedule a paper and fan its department slots out into supervisor tasks
pub async fn create_schedule(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateScheduleInput>,
) -> AppResult<(StatusCode, Json<ScheduleWithTasks>)> {
    user.require(RoleGroup::ProductionScheduler)?;
    let schedule = SchedulingService::new(state.db.clone())
        .create_schedule(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(schedule)))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateScheduleInput>,
) -> AppResult<Json<ProductionSchedule>> {
    user.require(RoleGroup::ProductionScheduler)?;
    Ok(Json(SchedulingService::new(state.db.clone()).update_schedule(id, input).await?))
}

pub async fn update_schedule_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<ScheduleStatusInput>,
) -> AppResult<Json<ProductionSchedule>> {
    user.require_any(&[RoleGroup::ProductionManager, RoleGroup::ProductionScheduler])?;
    let schedule = SchedulingService::new(state.db.clone())
        .update_schedule_status(id, input.status)
        .await?;
    Ok(Json(schedule))
}

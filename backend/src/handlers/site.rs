//! Site installation handlers
//!
//! Site supervisors manage sites, flats and captains. Carpenter captains
//! record frame and door fixing against the flats they look after.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use shared::{FixingGapCounts, RoleGroup};
use uuid::Uuid;

use crate::error::AppResult;
use crate::middleware::CurrentUser;
use crate::services::site::{
    AddPhotoInput, AssignCaptainInput, CarpenterCaptain, CreateDoorFixingInput, CreateFlatInput,
    CreateFrameFixingInput, CreateProgressInput, CreateSiteInput, CreateSiteMeasurementInput,
    DailyProgress, DoorFixing, Flat, FlatFilter, FlatPending, FrameFixing, RaiseSiteIssueInput,
    Site, SiteDashboard, SiteIssue, SiteIssueFilter, SiteMeasurement, SiteMeasurementStatusInput,
    SitePhoto, UpdateDoorFixingInput, UpdateFlatInput, UpdateFrameFixingInput, UpdateSiteInput,
    UpdateSiteIssueInput, WingCompletion,
};
use crate::services::SiteService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct CaptainQuery {
    pub site_id: Option<Uuid>,
}

fn sites(state: &AppState) -> SiteService {
    SiteService::new(state.db.clone())
}

// ---- Sites ----

pub async fn list_sites(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<Site>>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).list_sites().await?))
}

pub async fn get_site(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Site>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).get_site(id).await?))
}

pub async fn create_site(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateSiteInput>,
) -> AppResult<(StatusCode, Json<Site>)> {
    user.require(RoleGroup::SiteSupervisor)?;
    let site = sites(&state).create_site(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(site)))
}

pub async fn update_site(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSiteInput>,
) -> AppResult<Json<Site>> {
    user.require(RoleGroup::SiteSupervisor)?;
    Ok(Json(sites(&state).update_site(id, input).await?))
}

pub async fn delete_site(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(RoleGroup::SiteSupervisor)?;
    sites(&state).delete_site(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Flats ----

pub async fn list_flats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<FlatFilter>,
) -> AppResult<Json<Vec<Flat>>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).list_flats(filter).await?))
}

pub async fn get_flat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Flat>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).get_flat(id).await?))
}

pub async fn create_flat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateFlatInput>,
) -> AppResult<(StatusCode, Json<Flat>)> {
    user.require(RoleGroup::SiteSupervisor)?;
    let flat = sites(&state).create_flat(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(flat)))
}

pub async fn update_flat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateFlatInput>,
) -> AppResult<Json<Flat>> {
    user.require(RoleGroup::SiteSupervisor)?;
    Ok(Json(sites(&state).update_flat(id, input).await?))
}

pub async fn delete_flat(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    user.require(RoleGroup::SiteSupervisor)?;
    sites(&state).delete_flat(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Site measurements ----

pub async fn list_measurements(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(flat_id): Path<Uuid>,
) -> AppResult<Json<Vec<SiteMeasurement>>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).list_measurements(flat_id).await?))
}

pub async fn create_measurement(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateSiteMeasurementInput>,
) -> AppResult<(StatusCode, Json<SiteMeasurement>)> {
    user.require(RoleGroup::CarpenterCaptain)?;
    let measurement = sites(&state).create_measurement(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(measurement)))
}

pub async fn update_measurement_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<SiteMeasurementStatusInput>,
) -> AppResult<Json<SiteMeasurement>> {
    user.require(RoleGroup::SiteSupervisor)?;
    Ok(Json(sites(&state).update_measurement_status(id, input).await?))
}

// ---- Fixing ----

pub async fn list_frame_fixings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(flat_id): Path<Uuid>,
) -> AppResult<Json<Vec<FrameFixing>>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).list_frame_fixings(flat_id).await?))
}

pub async fn record_frame_fixing(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateFrameFixingInput>,
) -> AppResult<(StatusCode, Json<FrameFixing>)> {
    user.require(RoleGroup::CarpenterCaptain)?;
    let fixing = sites(&state).record_frame_fixing(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(fixing)))
}

pub async fn update_frame_fixing(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateFrameFixingInput>,
) -> AppResult<Json<FrameFixing>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).update_frame_fixing(id, input).await?))
}

pub async fn list_door_fixings(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(flat_id): Path<Uuid>,
) -> AppResult<Json<Vec<DoorFixing>>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).list_door_fixings(flat_id).await?))
}

pub async fn record_door_fixing(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateDoorFixingInput>,
) -> AppResult<(StatusCode, Json<DoorFixing>)> {
    user.require(RoleGroup::CarpenterCaptain)?;
    let fixing = sites(&state).record_door_fixing(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(fixing)))
}

pub async fn update_door_fixing(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateDoorFixingInput>,
) -> AppResult<Json<DoorFixing>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).update_door_fixing(id, input).await?))
}

// ---- Progress, issues and photos ----

pub async fn list_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(site_id): Path<Uuid>,
) -> AppResult<Json<Vec<DailyProgress>>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).list_progress(site_id).await?))
}

pub async fn report_progress(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateProgressInput>,
) -> AppResult<(StatusCode, Json<DailyProgress>)> {
    user.require(RoleGroup::CarpenterCaptain)?;
    let progress = sites(&state).report_progress(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(progress)))
}

pub async fn list_issues(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(filter): Query<SiteIssueFilter>,
) -> AppResult<Json<Vec<SiteIssue>>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).list_issues(filter).await?))
}

pub async fn raise_issue(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<RaiseSiteIssueInput>,
) -> AppResult<(StatusCode, Json<SiteIssue>)> {
    user.require(RoleGroup::CarpenterCaptain)?;
    let issue = sites(&state).raise_issue(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(issue)))
}

pub async fn update_issue(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSiteIssueInput>,
) -> AppResult<Json<SiteIssue>> {
    user.require(RoleGroup::SiteSupervisor)?;
    Ok(Json(sites(&state).update_issue(user.user_id, id, input).await?))
}

pub async fn list_photos(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(site_id): Path<Uuid>,
) -> AppResult<Json<Vec<SitePhoto>>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).list_photos(site_id).await?))
}

pub async fn add_photo(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<AddPhotoInput>,
) -> AppResult<(StatusCode, Json<SitePhoto>)> {
    user.require(RoleGroup::CarpenterCaptain)?;
    let photo = sites(&state).add_photo(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(photo)))
}

// ---- Captains ----

pub async fn list_captains(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<CaptainQuery>,
) -> AppResult<Json<Vec<CarpenterCaptain>>> {
    user.require(RoleGroup::SiteSupervisor)?;
    Ok(Json(sites(&state).list_captains(query.site_id).await?))
}

pub async fn assign_captain(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<AssignCaptainInput>,
) -> AppResult<(StatusCode, Json<CarpenterCaptain>)> {
    user.require(RoleGroup::SiteSupervisor)?;
    let captain = sites(&state).assign_captain(user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(captain)))
}

/// Flats on the sites the calling captain is assigned to
pub async fn my_flats(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<Flat>>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).captain_flats(user.user_id).await?))
}

// ---- Reports ----

pub async fn site_dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(site_id): Path<Uuid>,
) -> AppResult<Json<SiteDashboard>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).dashboard(site_id).await?))
}

pub async fn fixing_gap(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(site_id): Path<Uuid>,
) -> AppResult<Json<FixingGapCounts>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).fixing_gap(site_id).await?))
}

pub async fn wing_completion(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(site_id): Path<Uuid>,
) -> AppResult<Json<Vec<WingCompletion>>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).wing_completion(site_id).await?))
}

pub async fn flat_pending(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(site_id): Path<Uuid>,
) -> AppResult<Json<Vec<FlatPending>>> {
    user.require(RoleGroup::CarpenterCaptain)?;
    Ok(Json(sites(&state).flat_pending(site_id).await?))
}

//! Quality control handlers

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
use crate::services::production::{NextNumber, ProductionPaper};
use crate::services::quality::{
    CreateCertificateInput, CreateQualityCheckInput, CreateReworkInput, QcCertificate, QualityCheck,
    QualityFilter, QualityStats, RejectQualityCheckInput, ReworkJob, UpdateReworkInput,
};
use crate::services::QualityService;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReworkQuery {
    pub status: Option<String>,
}

pub async fn list_checks(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(filter): Query<QualityFilter>,
) -> AppResult<Json<Vec<QualityCheck>>> {
    Ok(Json(QualityService::new(state.db.clone()).list_checks(filter).await?))
}

pub async fn get_check(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<QualityCheck>> {
    Ok(Json(QualityService::new(state.db.clone()).get_check(id).await?))
}

pub async fn next_check_number(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<NextNumber>> {
    user.require(RoleGroup::QualityChecker)?;
    Ok(Json(QualityService::new(state.db.clone()).next_check_number().await?))
}

pub async fn create_check(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateQualityCheckInput>,
) -> AppResult<(StatusCode, Json<QualityCheck>)> {
    user.require(RoleGroup::QualityChecker)?;
    let check = QualityService::new(state.db.clone())
        .create_check(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(check)))
}

/// Approving also releases the paper for dispatch
pub async fn approve_check(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<QualityCheck>> {
    user.require(RoleGroup::QualityChecker)?;
    let check = QualityService::new(state.db.clone())
        .approve_check(user.user_id, id)
        .await?;
    Ok(Json(check))
}

pub async fn reject_check(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<RejectQualityCheckInput>,
) -> AppResult<Json<QualityCheck>> {
    user.require(RoleGroup::QualityChecker)?;
    Ok(Json(QualityService::new(state.db.clone()).reject_check(id, input).await?))
}

pub async fn pending_papers(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Json<Vec<ProductionPaper>>> {
    user.require_any(&[RoleGroup::QualityChecker, RoleGroup::ProductionManager])?;
    Ok(Json(QualityService::new(state.db.clone()).pending_papers().await?))
}

pub async fn history(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> AppResult<Json<Vec<QualityCheck>>> {
    Ok(Json(QualityService::new(state.db.clone()).history().await?))
}

pub async fn stats(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> AppResult<Json<QualityStats>> {
    Ok(Json(QualityService::new(state.db.clone()).stats().await?))
}

// ---- Rework ----

pub async fn list_rework(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
    Query(query): Query<ReworkQuery>,
) -> AppResult<Json<Vec<ReworkJob>>> {
    Ok(Json(QualityService::new(state.db.clone()).list_rework(query.status).await?))
}

pub async fn create_rework(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateReworkInput>,
) -> AppResult<(StatusCode, Json<ReworkJob>)> {
    user.require(RoleGroup::QualityChecker)?;
    let job = QualityService::new(state.db.clone())
        .create_rework(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(job)))
}

pub async fn update_rework(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateReworkInput>,
) -> AppResult<Json<ReworkJob>> {
    user.require_any(&[RoleGroup::QualityChecker, RoleGroup::ProductionManager])?;
    Ok(Json(QualityService::new(state.db.clone()).update_rework(id, input).await?))
}

// ---- Certificates ----

pub async fn list_certificates(
    State(state): State<AppState>,
    CurrentUser(_user): CurrentUser,
) -> AppResult<Json<Vec<QcCertificate>>> {
    Ok(Json(QualityService::new(state.db.clone()).list_certificates().await?))
}

pub async fn issue_certificate(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(input): Json<CreateCertificateInput>,
) -> AppResult<(StatusCode, Json<QcCertificate>)> {
    user.require(RoleGroup::QualityChecker)?;
    let certificate = QualityService::new(state.db.clone())
        .issue_certificate(user.user_id, input)
        .await?;
    Ok((StatusCode::CREATED, Json(certificate)))
}

//! Site installation tracking
//!
//! Sites are broken into wings and flats. Frame and door fixing records keep
//! the `frame_fixed` and `door_fixed` flags of their flat current; the reports
//! at the bottom read those flags.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    completion_percent, ensure_transition, numbering, pending_doors, DoorRequirements,
    FixingGapCounts, FixingStatus, Role, SiteIssueStatus, SiteMeasurementStatus,
};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{check_field, AppError, AppResult};
use crate::services::numbering::next_number;
use crate::services::status::{delete_row, lock_status};

#[derive(Clone)]
pub struct SiteService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Site {
    pub id: Uuid,
    pub site_code: String,
    pub site_project_id: Option<Uuid>,
    pub builder_name: String,
    pub project_name: String,
    pub location: Option<String>,
    pub address: Option<String>,
    pub wings: Json<Vec<String>>,
    pub total_floors: Option<i32>,
    pub total_flats: Option<i32>,
    pub site_status: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSiteInput {
    pub site_project_id: Option<Uuid>,
    pub builder_name: String,
    pub project_name: String,
    pub location: Option<String>,
    pub address: Option<String>,
    #[serde(default)]
    pub wings: Vec<String>,
    pub total_floors: Option<i32>,
    pub total_flats: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSiteInput {
    pub builder_name: Option<String>,
    pub project_name: Option<String>,
    pub location: Option<String>,
    pub address: Option<String>,
    pub wings: Option<Vec<String>>,
    pub total_floors: Option<i32>,
    pub total_flats: Option<i32>,
    pub site_status: Option<String>,
}

const SITE_COLUMNS: &str = "id, site_code, site_project_id, builder_name, project_name, location, \
     address, wings, total_floors, total_flats, site_status, created_by, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Flat {
    pub id: Uuid,
    pub site_id: Uuid,
    pub wing: String,
    pub floor: i32,
    pub flat_number: String,
    pub main_door_required: bool,
    pub bedroom_door_required: bool,
    pub bathroom_door_required: bool,
    pub kitchen_door_required: bool,
    pub frame_fixed: bool,
    pub door_fixed: bool,
    pub remarks: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flat {
    pub fn requirements(&self) -> DoorRequirements {
        DoorRequirements {
            main_door: self.main_door_required,
            bedroom_door: self.bedroom_door_required,
            bathroom_door: self.bathroom_door_required,
            kitchen_door: self.kitchen_door_required,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateFlatInput {
    pub site_id: Uuid,
    pub wing: String,
    pub floor: i32,
    pub flat_number: String,
    #[serde(flatten)]
    pub doors: DoorRequirements,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFlatInput {
    pub floor: Option<i32>,
    pub main_door: Option<bool>,
    pub bedroom_door: Option<bool>,
    pub bathroom_door: Option<bool>,
    pub kitchen_door: Option<bool>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FlatFilter {
    pub site_id: Option<Uuid>,
    pub wing: Option<String>,
}

const FLAT_COLUMNS: &str = "id, site_id, wing, floor, flat_number, main_door_required, \
     bedroom_door_required, bathroom_door_required, kitchen_door_required, frame_fixed, \
     door_fixed, remarks, created_by, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SiteMeasurement {
    pub id: Uuid,
    pub flat_id: Uuid,
    pub site_id: Uuid,
    pub location: String,
    pub door_type: String,
    pub width_mm: Decimal,
    pub height_mm: Decimal,
    pub wall_thickness: Option<Decimal>,
    pub handing: Option<String>,
    pub frame_type: Option<String>,
    pub special_note: Option<String>,
    pub status: String,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSiteMeasurementInput {
    pub flat_id: Uuid,
    pub location: String,
    pub door_type: String,
    pub width_mm: Decimal,
    pub height_mm: Decimal,
    pub wall_thickness: Option<Decimal>,
    pub handing: Option<String>,
    pub frame_type: Option<String>,
    pub special_note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SiteMeasurementStatusInput {
    pub status: SiteMeasurementStatus,
}

const SITE_MEASUREMENT_COLUMNS: &str = "id, flat_id, site_id, location, door_type, width_mm, \
     height_mm, wall_thickness, handing, frame_type, special_note, status, created_by, \
     created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct FrameFixing {
    pub id: Uuid,
    pub flat_id: Uuid,
    pub site_id: Uuid,
    pub frame_type: String,
    pub fixing_status: String,
    pub fixing_date: Option<NaiveDate>,
    pub contractor: Option<String>,
    pub floor_readiness: bool,
    pub issue: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateFrameFixingInput {
    pub flat_id: Uuid,
    pub frame_type: String,
    pub fixing_status: FixingStatus,
    pub fixing_date: Option<NaiveDate>,
    pub contractor: Option<String>,
    #[serde(default)]
    pub floor_readiness: bool,
    pub issue: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateFrameFixingInput {
    pub fixing_status: Option<FixingStatus>,
    pub fixing_date: Option<NaiveDate>,
    pub contractor: Option<String>,
    pub floor_readiness: Option<bool>,
    pub issue: Option<String>,
}

const FRAME_FIXING_COLUMNS: &str = "id, flat_id, site_id, frame_type, fixing_status, fixing_date, \
     contractor, floor_readiness, issue, created_by, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DoorFixing {
    pub id: Uuid,
    pub flat_id: Uuid,
    pub site_id: Uuid,
    pub door_type: String,
    pub fixing_status: String,
    pub reason: Option<String>,
    pub expected_resume_date: Option<NaiveDate>,
    pub customer_instruction: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDoorFixingInput {
    pub flat_id: Uuid,
    pub door_type: String,
    pub fixing_status: FixingStatus,
    pub reason: Option<String>,
    pub expected_resume_date: Option<NaiveDate>,
    pub customer_instruction: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDoorFixingInput {
    pub fixing_status: Option<FixingStatus>,
    pub reason: Option<String>,
    pub expected_resume_date: Option<NaiveDate>,
    pub customer_instruction: Option<String>,
}

const DOOR_FIXING_COLUMNS: &str = "id, flat_id, site_id, door_type, fixing_status, reason, \
     expected_resume_date, customer_instruction, created_by, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DailyProgress {
    pub id: Uuid,
    pub site_id: Uuid,
    pub report_date: NaiveDate,
    pub wing: Option<String>,
    pub floors_covered: Option<String>,
    pub frames_fixed_today: i32,
    pub doors_fixed_today: i32,
    pub work_front_available: bool,
    pub constraints: Option<String>,
    pub tomorrow_plan: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateProgressInput {
    pub site_id: Uuid,
    pub report_date: Option<NaiveDate>,
    pub wing: Option<String>,
    pub floors_covered: Option<String>,
    #[serde(default)]
    pub frames_fixed_today: i32,
    #[serde(default)]
    pub doors_fixed_today: i32,
    #[serde(default = "default_true")]
    pub work_front_available: bool,
    pub constraints: Option<String>,
    pub tomorrow_plan: Option<String>,
}

const PROGRESS_COLUMNS: &str = "id, site_id, report_date, wing, floors_covered, frames_fixed_today, \
     doors_fixed_today, work_front_available, constraints, tomorrow_plan, created_by, created_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SiteIssue {
    pub id: Uuid,
    pub site_id: Uuid,
    pub flat_id: Option<Uuid>,
    pub issue_type: String,
    pub title: String,
    pub description: String,
    pub wing: Option<String>,
    pub floor: Option<i32>,
    pub status: String,
    pub resolution_notes: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<Uuid>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct RaiseSiteIssueInput {
    pub site_id: Uuid,
    pub flat_id: Option<Uuid>,
    pub issue_type: String,
    pub title: String,
    pub description: String,
    pub wing: Option<String>,
    pub floor: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateSiteIssueInput {
    pub status: SiteIssueStatus,
    pub resolution_notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SiteIssueFilter {
    pub site_id: Option<Uuid>,
    pub status: Option<String>,
}

const ISSUE_COLUMNS: &str = "id, site_id, flat_id, issue_type, title, description, wing, floor, \
     status, resolution_notes, resolved_at, resolved_by, created_by, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SitePhoto {
    pub id: Uuid,
    pub site_id: Uuid,
    pub flat_id: Option<Uuid>,
    pub photo_type: String,
    pub photo_url: String,
    pub caption: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AddPhotoInput {
    pub site_id: Uuid,
    pub flat_id: Option<Uuid>,
    pub photo_type: String,
    pub photo_url: String,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CarpenterCaptain {
    pub id: Uuid,
    pub user_id: Uuid,
    pub site_id: Uuid,
    pub wing: Option<String>,
    pub is_active: bool,
    pub assigned_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AssignCaptainInput {
    pub user_id: Uuid,
    pub site_id: Uuid,
    pub wing: Option<String>,
}

const CAPTAIN_COLUMNS: &str = "id, user_id, site_id, wing, is_active, assigned_by, created_at";

#[derive(Debug, Serialize)]
pub struct SiteDashboard {
    pub site_id: Uuid,
    pub total_flats: i64,
    pub frames_pending: i64,
    pub doors_pending: i64,
    pub fully_complete: i64,
}

#[derive(Debug, Serialize)]
pub struct FlatPending {
    pub flat_id: Uuid,
    pub wing: String,
    pub floor: i32,
    pub flat_number: String,
    pub frame_fixed: bool,
    pub pending_doors: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WingCompletion {
    pub wing: String,
    pub total_flats: i64,
    pub frames_fixed: i64,
    pub doors_fixed: i64,
    pub frame_percent: Decimal,
    pub door_percent: Decimal,
}

/// Per-wing completion from `(wing, frame_fixed, door_fixed)` rows
fn wing_completion(rows: &[(String, bool, bool)]) -> Vec<WingCompletion> {
    let mut wings: BTreeMap<&str, (i64, i64, i64)> = BTreeMap::new();
    for (wing, frame_fixed, door_fixed) in rows {
        let entry = wings.entry(wing.as_str()).or_default();
        entry.0 += 1;
        entry.1 += i64::from(*frame_fixed);
        entry.2 += i64::from(*door_fixed);
    }
    wings
        .into_iter()
        .map(|(wing, (total, frames, doors))| WingCompletion {
            wing: wing.to_string(),
            total_flats: total,
            frames_fixed: frames,
            doors_fixed: doors,
            frame_percent: completion_percent(frames, total),
            door_percent: completion_percent(doors, total),
        })
        .collect()
}

/// Site of a flat, `NotFound` when the flat does not exist
async fn flat_site(conn: &mut PgConnection, flat_id: Uuid) -> AppResult<Uuid> {
    sqlx::query_scalar::<_, Uuid>("SELECT site_id FROM flats WHERE id = $1 FOR UPDATE")
        .bind(flat_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Flat".to_string()))
}

async fn ensure_site(conn: &mut PgConnection, site_id: Uuid) -> AppResult<()> {
    sqlx::query_scalar::<_, Uuid>("SELECT id FROM sites WHERE id = $1")
        .bind(site_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Site".to_string()))?;
    Ok(())
}

/// Recompute a flat's fixing flag from its completed fixing records
async fn sync_flat_flag(
    conn: &mut PgConnection,
    flat_id: Uuid,
    flag: &'static str,
    fixings_table: &'static str,
) -> AppResult<bool> {
    let sql = format!(
        "UPDATE flats SET {flag} = EXISTS (SELECT 1 FROM {fixings_table} \
             WHERE flat_id = $1 AND fixing_status = $2), updated_at = NOW() \
         WHERE id = $1 RETURNING {flag}"
    );
    let fixed = sqlx::query_scalar::<_, bool>(&sql)
        .bind(flat_id)
        .bind(FixingStatus::Completed.as_str())
        .fetch_one(conn)
        .await?;
    Ok(fixed)
}

impl SiteService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ---- Sites ----

    pub async fn list_sites(&self) -> AppResult<Vec<Site>> {
        let sql = format!("SELECT {SITE_COLUMNS} FROM sites ORDER BY site_code");
        let sites = sqlx::query_as::<_, Site>(&sql).fetch_all(&self.db).await?;
        Ok(sites)
    }

    pub async fn get_site(&self, id: Uuid) -> AppResult<Site> {
        let sql = format!("SELECT {SITE_COLUMNS} FROM sites WHERE id = $1");
        sqlx::query_as::<_, Site>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Site".to_string()))
    }

    pub async fn create_site(&self, user_id: Uuid, input: CreateSiteInput) -> AppResult<Site> {
        check_field("builder_name", shared::validate_non_empty(&input.builder_name))?;
        check_field("project_name", shared::validate_non_empty(&input.project_name))?;

        let mut tx = self.db.begin().await?;
        let code = next_number(&mut tx, "sites", "site_code", numbering::SITE).await?;
        let sql = format!(
            r#"
            INSERT INTO sites (site_code, site_project_id, builder_name, project_name, location, address,
                               wings, total_floors, total_flats, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {SITE_COLUMNS}
            "#
        );
        let site = sqlx::query_as::<_, Site>(&sql)
            .bind(&code)
            .bind(input.site_project_id)
            .bind(input.builder_name.trim())
            .bind(input.project_name.trim())
            .bind(input.location)
            .bind(input.address)
            .bind(Json(&input.wings))
            .bind(input.total_floors)
            .bind(input.total_flats)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(site = %code, project = %site.project_name, "Site registered");
        Ok(site)
    }

    pub async fn update_site(&self, id: Uuid, input: UpdateSiteInput) -> AppResult<Site> {
        let sql = format!(
            r#"
            UPDATE sites SET
                builder_name = COALESCE($2, builder_name),
                project_name = COALESCE($3, project_name),
                location = COALESCE($4, location),
                address = COALESCE($5, address),
                wings = COALESCE($6, wings),
                total_floors = COALESCE($7, total_floors),
                total_flats = COALESCE($8, total_flats),
                site_status = COALESCE($9, site_status),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {SITE_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Site>(&sql)
            .bind(id)
            .bind(input.builder_name)
            .bind(input.project_name)
            .bind(input.location)
            .bind(input.address)
            .bind(input.wings.as_ref().map(Json))
            .bind(input.total_floors)
            .bind(input.total_flats)
            .bind(input.site_status)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Site".to_string()))
    }

    pub async fn delete_site(&self, id: Uuid) -> AppResult<()> {
        delete_row(&self.db, "sites", id, "Site").await
    }

    // ---- Flats ----

    pub async fn list_flats(&self, filter: FlatFilter) -> AppResult<Vec<Flat>> {
        let sql = format!(
            "SELECT {FLAT_COLUMNS} FROM flats \
             WHERE ($1::uuid IS NULL OR site_id = $1) AND ($2::text IS NULL OR wing = $2) \
             ORDER BY wing, floor, flat_number"
        );
        let flats = sqlx::query_as::<_, Flat>(&sql)
            .bind(filter.site_id)
            .bind(filter.wing)
            .fetch_all(&self.db)
            .await?;
        Ok(flats)
    }

    pub async fn get_flat(&self, id: Uuid) -> AppResult<Flat> {
        let sql = format!("SELECT {FLAT_COLUMNS} FROM flats WHERE id = $1");
        sqlx::query_as::<_, Flat>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Flat".to_string()))
    }

    pub async fn create_flat(&self, user_id: Uuid, input: CreateFlatInput) -> AppResult<Flat> {
        check_field("wing", shared::validate_non_empty(&input.wing))?;
        check_field("flat_number", shared::validate_non_empty(&input.flat_number))?;

        let mut conn = self.db.acquire().await?;
        ensure_site(&mut conn, input.site_id).await?;

        let sql = format!(
            r#"
            INSERT INTO flats (site_id, wing, floor, flat_number, main_door_required, bedroom_door_required,
                               bathroom_door_required, kitchen_door_required, remarks, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {FLAT_COLUMNS}
            "#
        );
        let flat = sqlx::query_as::<_, Flat>(&sql)
            .bind(input.site_id)
            .bind(input.wing.trim())
            .bind(input.floor)
            .bind(input.flat_number.trim())
            .bind(input.doors.main_door)
            .bind(input.doors.bedroom_door)
            .bind(input.doors.bathroom_door)
            .bind(input.doors.kitchen_door)
            .bind(input.remarks)
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(flat)
    }

    pub async fn update_flat(&self, id: Uuid, input: UpdateFlatInput) -> AppResult<Flat> {
        let sql = format!(
            r#"
            UPDATE flats SET
                floor = COALESCE($2, floor),
                main_door_required = COALESCE($3, main_door_required),
                bedroom_door_required = COALESCE($4, bedroom_door_required),
                bathroom_door_required = COALESCE($5, bathroom_door_required),
                kitchen_door_required = COALESCE($6, kitchen_door_required),
                remarks = COALESCE($7, remarks),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {FLAT_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Flat>(&sql)
            .bind(id)
            .bind(input.floor)
            .bind(input.main_door)
            .bind(input.bedroom_door)
            .bind(input.bathroom_door)
            .bind(input.kitchen_door)
            .bind(input.remarks)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Flat".to_string()))
    }

    pub async fn delete_flat(&self, id: Uuid) -> AppResult<()> {
        delete_row(&self.db, "flats", id, "Flat").await
    }

    // ---- Site measurements ----

    pub async fn list_measurements(&self, flat_id: Uuid) -> AppResult<Vec<SiteMeasurement>> {
        let sql = format!(
            "SELECT {SITE_MEASUREMENT_COLUMNS} FROM site_measurements WHERE flat_id = $1 ORDER BY created_at"
        );
        let measurements = sqlx::query_as::<_, SiteMeasurement>(&sql)
            .bind(flat_id)
            .fetch_all(&self.db)
            .await?;
        Ok(measurements)
    }

    pub async fn create_measurement(
        &self,
        user_id: Uuid,
        input: CreateSiteMeasurementInput,
    ) -> AppResult<SiteMeasurement> {
        check_field("width_mm", shared::validate_positive(input.width_mm))?;
        check_field("height_mm", shared::validate_positive(input.height_mm))?;
        if let Some(thickness) = input.wall_thickness {
            check_field("wall_thickness", shared::validate_non_negative(thickness))?;
        }

        let mut tx = self.db.begin().await?;
        let site_id = flat_site(&mut tx, input.flat_id).await?;
        let sql = format!(
            r#"
            INSERT INTO site_measurements (flat_id, site_id, location, door_type, width_mm, height_mm,
                                           wall_thickness, handing, frame_type, special_note, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {SITE_MEASUREMENT_COLUMNS}
            "#
        );
        let measurement = sqlx::query_as::<_, SiteMeasurement>(&sql)
            .bind(input.flat_id)
            .bind(site_id)
            .bind(input.location)
            .bind(input.door_type)
            .bind(input.width_mm)
            .bind(input.height_mm)
            .bind(input.wall_thickness)
            .bind(input.handing)
            .bind(input.frame_type)
            .bind(input.special_note)
            .bind(SiteMeasurementStatus::Pending.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(measurement)
    }

    pub async fn update_measurement_status(
        &self,
        id: Uuid,
        input: SiteMeasurementStatusInput,
    ) -> AppResult<SiteMeasurement> {
        let mut tx = self.db.begin().await?;
        let current: SiteMeasurementStatus =
            lock_status(&mut tx, "site_measurements", id, "Site measurement").await?;
        ensure_transition(current, input.status)?;

        let sql = format!(
            "UPDATE site_measurements SET status = $2, updated_at = NOW() WHERE id = $1 \
             RETURNING {SITE_MEASUREMENT_COLUMNS}"
        );
        let measurement = sqlx::query_as::<_, SiteMeasurement>(&sql)
            .bind(id)
            .bind(input.status.as_str())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(measurement)
    }

    // ---- Fixings ----

    pub async fn list_frame_fixings(&self, flat_id: Uuid) -> AppResult<Vec<FrameFixing>> {
        let sql = format!(
            "SELECT {FRAME_FIXING_COLUMNS} FROM frame_fixings WHERE flat_id = $1 ORDER BY created_at"
        );
        let fixings = sqlx::query_as::<_, FrameFixing>(&sql)
            .bind(flat_id)
            .fetch_all(&self.db)
            .await?;
        Ok(fixings)
    }

    pub async fn record_frame_fixing(
        &self,
        user_id: Uuid,
        input: CreateFrameFixingInput,
    ) -> AppResult<FrameFixing> {
        check_field("frame_type", shared::validate_non_empty(&input.frame_type))?;

        let mut tx = self.db.begin().await?;
        let site_id = flat_site(&mut tx, input.flat_id).await?;
        let sql = format!(
            r#"
            INSERT INTO frame_fixings (flat_id, site_id, frame_type, fixing_status, fixing_date, contractor,
                                       floor_readiness, issue, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {FRAME_FIXING_COLUMNS}
            "#
        );
        let fixing = sqlx::query_as::<_, FrameFixing>(&sql)
            .bind(input.flat_id)
            .bind(site_id)
            .bind(input.frame_type)
            .bind(input.fixing_status.as_str())
            .bind(input.fixing_date)
            .bind(input.contractor)
            .bind(input.floor_readiness)
            .bind(input.issue)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        let frame_fixed = sync_flat_flag(&mut tx, input.flat_id, "frame_fixed", "frame_fixings").await?;

        tx.commit().await?;
        tracing::info!(flat_id = %input.flat_id, status = %input.fixing_status, frame_fixed, "Frame fixing recorded");
        Ok(fixing)
    }

    pub async fn update_frame_fixing(&self, id: Uuid, input: UpdateFrameFixingInput) -> AppResult<FrameFixing> {
        let mut tx = self.db.begin().await?;
        let sql = format!(
            r#"
            UPDATE frame_fixings SET
                fixing_status = COALESCE($2, fixing_status),
                fixing_date = COALESCE($3, fixing_date),
                contractor = COALESCE($4, contractor),
                floor_readiness = COALESCE($5, floor_readiness),
                issue = COALESCE($6, issue),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {FRAME_FIXING_COLUMNS}
            "#
        );
        let fixing = sqlx::query_as::<_, FrameFixing>(&sql)
            .bind(id)
            .bind(input.fixing_status.map(|s| s.as_str()))
            .bind(input.fixing_date)
            .bind(input.contractor)
            .bind(input.floor_readiness)
            .bind(input.issue)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Frame fixing".to_string()))?;
        sync_flat_flag(&mut tx, fixing.flat_id, "frame_fixed", "frame_fixings").await?;

        tx.commit().await?;
        Ok(fixing)
    }

    pub async fn list_door_fixings(&self, flat_id: Uuid) -> AppResult<Vec<DoorFixing>> {
        let sql = format!(
            "SELECT {DOOR_FIXING_COLUMNS} FROM door_fixings WHERE flat_id = $1 ORDER BY created_at"
        );
        let fixings = sqlx::query_as::<_, DoorFixing>(&sql)
            .bind(flat_id)
            .fetch_all(&self.db)
            .await?;
        Ok(fixings)
    }

    pub async fn record_door_fixing(&self, user_id: Uuid, input: CreateDoorFixingInput) -> AppResult<DoorFixing> {
        check_field("door_type", shared::validate_non_empty(&input.door_type))?;

        let mut tx = self.db.begin().await?;
        let site_id = flat_site(&mut tx, input.flat_id).await?;
        let sql = format!(
            r#"
            INSERT INTO door_fixings (flat_id, site_id, door_type, fixing_status, reason, expected_resume_date,
                                      customer_instruction, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {DOOR_FIXING_COLUMNS}
            "#
        );
        let fixing = sqlx::query_as::<_, DoorFixing>(&sql)
            .bind(input.flat_id)
            .bind(site_id)
            .bind(input.door_type)
            .bind(input.fixing_status.as_str())
            .bind(input.reason)
            .bind(input.expected_resume_date)
            .bind(input.customer_instruction)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;
        let door_fixed = sync_flat_flag(&mut tx, input.flat_id, "door_fixed", "door_fixings").await?;

        tx.commit().await?;
        tracing::info!(flat_id = %input.flat_id, status = %input.fixing_status, door_fixed, "Door fixing recorded");
        Ok(fixing)
    }

    pub async fn update_door_fixing(&self, id: Uuid, input: UpdateDoorFixingInput) -> AppResult<DoorFixing> {
        let mut tx = self.db.begin().await?;
        let sql = format!(
            r#"
            UPDATE door_fixings SET
                fixing_status = COALESCE($2, fixing_status),
                reason = COALESCE($3, reason),
                expected_resume_date = COALESCE($4, expected_resume_date),
                customer_instruction = COALESCE($5, customer_instruction),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {DOOR_FIXING_COLUMNS}
            "#
        );
        let fixing = sqlx::query_as::<_, DoorFixing>(&sql)
            .bind(id)
            .bind(input.fixing_status.map(|s| s.as_str()))
            .bind(input.reason)
            .bind(input.expected_resume_date)
            .bind(input.customer_instruction)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Door fixing".to_string()))?;
        sync_flat_flag(&mut tx, fixing.flat_id, "door_fixed", "door_fixings").await?;

        tx.commit().await?;
        Ok(fixing)
    }

    // ---- Daily progress ----

    pub async fn list_progress(&self, site_id: Uuid) -> AppResult<Vec<DailyProgress>> {
        let sql = format!(
            "SELECT {PROGRESS_COLUMNS} FROM daily_site_progress WHERE site_id = $1 ORDER BY report_date DESC"
        );
        let reports = sqlx::query_as::<_, DailyProgress>(&sql)
            .bind(site_id)
            .fetch_all(&self.db)
            .await?;
        Ok(reports)
    }

    /// One report per site and day; a second one fails on the unique key
    pub async fn report_progress(&self, user_id: Uuid, input: CreateProgressInput) -> AppResult<DailyProgress> {
        if input.frames_fixed_today < 0 || input.doors_fixed_today < 0 {
            return Err(AppError::validation("frames_fixed_today", "Counts cannot be negative"));
        }

        let mut conn = self.db.acquire().await?;
        ensure_site(&mut conn, input.site_id).await?;
        let sql = format!(
            r#"
            INSERT INTO daily_site_progress (site_id, report_date, wing, floors_covered, frames_fixed_today,
                                             doors_fixed_today, work_front_available, constraints,
                                             tomorrow_plan, created_by)
            VALUES ($1, COALESCE($2, CURRENT_DATE), $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {PROGRESS_COLUMNS}
            "#
        );
        let report = sqlx::query_as::<_, DailyProgress>(&sql)
            .bind(input.site_id)
            .bind(input.report_date)
            .bind(input.wing)
            .bind(input.floors_covered)
            .bind(input.frames_fixed_today)
            .bind(input.doors_fixed_today)
            .bind(input.work_front_available)
            .bind(input.constraints)
            .bind(input.tomorrow_plan)
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;
        Ok(report)
    }

    // ---- Issues ----

    pub async fn list_issues(&self, filter: SiteIssueFilter) -> AppResult<Vec<SiteIssue>> {
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM site_issues \
             WHERE ($1::uuid IS NULL OR site_id = $1) AND ($2::text IS NULL OR status = $2) \
             ORDER BY created_at DESC"
        );
        let issues = sqlx::query_as::<_, SiteIssue>(&sql)
            .bind(filter.site_id)
            .bind(filter.status)
            .fetch_all(&self.db)
            .await?;
        Ok(issues)
    }

    pub async fn raise_issue(&self, user_id: Uuid, input: RaiseSiteIssueInput) -> AppResult<SiteIssue> {
        check_field("title", shared::validate_non_empty(&input.title))?;
        check_field("description", shared::validate_non_empty(&input.description))?;

        let mut conn = self.db.acquire().await?;
        ensure_site(&mut conn, input.site_id).await?;
        let sql = format!(
            r#"
            INSERT INTO site_issues (site_id, flat_id, issue_type, title, description, wing, floor, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {ISSUE_COLUMNS}
            "#
        );
        let issue = sqlx::query_as::<_, SiteIssue>(&sql)
            .bind(input.site_id)
            .bind(input.flat_id)
            .bind(input.issue_type)
            .bind(input.title)
            .bind(input.description)
            .bind(input.wing)
            .bind(input.floor)
            .bind(SiteIssueStatus::Open.as_str())
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;

        tracing::info!(site_id = %issue.site_id, issue_type = %issue.issue_type, "Site issue raised");
        Ok(issue)
    }

    pub async fn update_issue(&self, user_id: Uuid, id: Uuid, input: UpdateSiteIssueInput) -> AppResult<SiteIssue> {
        let mut tx = self.db.begin().await?;
        let current: SiteIssueStatus = lock_status(&mut tx, "site_issues", id, "Site issue").await?;
        ensure_transition(current, input.status)?;

        let resolving = input.status == SiteIssueStatus::Resolved;
        let sql = format!(
            r#"
            UPDATE site_issues SET
                status = $2,
                resolution_notes = COALESCE($3, resolution_notes),
                resolved_at = CASE WHEN $4 THEN NOW() ELSE resolved_at END,
                resolved_by = CASE WHEN $4 THEN $5 ELSE resolved_by END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ISSUE_COLUMNS}
            "#
        );
        let issue = sqlx::query_as::<_, SiteIssue>(&sql)
            .bind(id)
            .bind(input.status.as_str())
            .bind(input.resolution_notes)
            .bind(resolving)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(issue_id = %id, from = %current, to = %input.status, "Site issue updated");
        Ok(issue)
    }

    // ---- Photos ----

    pub async fn list_photos(&self, site_id: Uuid) -> AppResult<Vec<SitePhoto>> {
        let photos = sqlx::query_as::<_, SitePhoto>(
            "SELECT id, site_id, flat_id, photo_type, photo_url, caption, created_by, created_at \
             FROM site_photos WHERE site_id = $1 ORDER BY created_at DESC",
        )
        .bind(site_id)
        .fetch_all(&self.db)
        .await?;
        Ok(photos)
    }

    pub async fn add_photo(&self, user_id: Uuid, input: AddPhotoInput) -> AppResult<SitePhoto> {
        check_field("photo_type", shared::validate_non_empty(&input.photo_type))?;
        check_field("photo_url", shared::validate_non_empty(&input.photo_url))?;

        let mut conn = self.db.acquire().await?;
        ensure_site(&mut conn, input.site_id).await?;
        let photo = sqlx::query_as::<_, SitePhoto>(
            r#"
            INSERT INTO site_photos (site_id, flat_id, photo_type, photo_url, caption, created_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, site_id, flat_id, photo_type, photo_url, caption, created_by, created_at
            "#,
        )
        .bind(input.site_id)
        .bind(input.flat_id)
        .bind(input.photo_type)
        .bind(input.photo_url)
        .bind(input.caption)
        .bind(user_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(photo)
    }

    // ---- Carpenter captains ----

    pub async fn list_captains(&self, site_id: Option<Uuid>) -> AppResult<Vec<CarpenterCaptain>> {
        let sql = format!(
            "SELECT {CAPTAIN_COLUMNS} FROM carpenter_captains \
             WHERE ($1::uuid IS NULL OR site_id = $1) ORDER BY created_at"
        );
        let captains = sqlx::query_as::<_, CarpenterCaptain>(&sql)
            .bind(site_id)
            .fetch_all(&self.db)
            .await?;
        Ok(captains)
    }

    /// Assign a carpenter captain to a site; reassigning moves them to the given wing
    pub async fn assign_captain(&self, assigned_by: Uuid, input: AssignCaptainInput) -> AppResult<CarpenterCaptain> {
        let mut tx = self.db.begin().await?;
        let role = sqlx::query_scalar::<_, String>("SELECT role FROM users WHERE id = $1")
            .bind(input.user_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;
        if role != Role::CarpenterCaptain.as_str() {
            return Err(AppError::validation("user_id", "User is not a carpenter captain"));
        }
        ensure_site(&mut tx, input.site_id).await?;

        let sql = format!(
            r#"
            INSERT INTO carpenter_captains (user_id, site_id, wing, is_active, assigned_by)
            VALUES ($1, $2, $3, TRUE, $4)
            ON CONFLICT (user_id, site_id)
            DO UPDATE SET wing = EXCLUDED.wing, is_active = TRUE, assigned_by = EXCLUDED.assigned_by
            RETURNING {CAPTAIN_COLUMNS}
            "#
        );
        let captain = sqlx::query_as::<_, CarpenterCaptain>(&sql)
            .bind(input.user_id)
            .bind(input.site_id)
            .bind(input.wing)
            .bind(assigned_by)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(user_id = %input.user_id, site_id = %input.site_id, "Carpenter captain assigned");
        Ok(captain)
    }

    /// Flats on the sites (and wings, when set) a captain is assigned to
    pub async fn captain_flats(&self, user_id: Uuid) -> AppResult<Vec<Flat>> {
        let sql = format!(
            "SELECT {FLAT_COLUMNS} FROM flats f \
             WHERE EXISTS (SELECT 1 FROM carpenter_captains c \
                 WHERE c.site_id = f.site_id AND c.user_id = $1 AND c.is_active \
                   AND (c.wing IS NULL OR c.wing = f.wing)) \
             ORDER BY wing, floor, flat_number"
        );
        let flats = sqlx::query_as::<_, Flat>(&sql)
            .bind(user_id)
            .fetch_all(&self.db)
            .await?;
        Ok(flats)
    }

    // ---- Reports ----

    async fn fixing_flags(&self, site_id: Uuid) -> AppResult<Vec<(String, bool, bool)>> {
        let rows = sqlx::query_as::<_, (String, bool, bool)>(
            "SELECT wing, frame_fixed, door_fixed FROM flats WHERE site_id = $1",
        )
        .bind(site_id)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn dashboard(&self, site_id: Uuid) -> AppResult<SiteDashboard> {
        self.get_site(site_id).await?;
        let gaps = self.fixing_gap(site_id).await?;
        Ok(SiteDashboard {
            site_id,
            total_flats: gaps.complete + gaps.door_pending + gaps.frame_missing + gaps.not_started,
            frames_pending: gaps.frame_missing + gaps.not_started,
            doors_pending: gaps.door_pending + gaps.not_started,
            fully_complete: gaps.complete,
        })
    }

    pub async fn fixing_gap(&self, site_id: Uuid) -> AppResult<FixingGapCounts> {
        let mut counts = FixingGapCounts::default();
        for (_, frame_fixed, door_fixed) in self.fixing_flags(site_id).await? {
            counts.record(frame_fixed, door_fixed);
        }
        Ok(counts)
    }

    pub async fn wing_completion(&self, site_id: Uuid) -> AppResult<Vec<WingCompletion>> {
        let rows = self.fixing_flags(site_id).await?;
        Ok(wing_completion(&rows))
    }

    /// Flats that still need a frame or a required door
    pub async fn flat_pending(&self, site_id: Uuid) -> AppResult<Vec<FlatPending>> {
        let flats = self
            .list_flats(FlatFilter {
                site_id: Some(site_id),
                wing: None,
            })
            .await?;

        let fixed_rows = sqlx::query_as::<_, (Uuid, String)>(
            "SELECT flat_id, door_type FROM door_fixings WHERE site_id = $1 AND fixing_status = $2",
        )
        .bind(site_id)
        .bind(FixingStatus::Completed.as_str())
        .fetch_all(&self.db)
        .await?;
        let mut fixed: HashMap<Uuid, Vec<String>> = HashMap::new();
        for (flat_id, door_type) in fixed_rows {
            fixed.entry(flat_id).or_default().push(door_type);
        }

        Ok(flats
            .into_iter()
            .filter_map(|flat| {
                let done = fixed.get(&flat.id).map(Vec::as_slice).unwrap_or_default();
                let pending = pending_doors(flat.requirements(), done.iter().map(String::as_str));
                if flat.frame_fixed && pending.is_empty() {
                    return None;
                }
                Some(FlatPending {
                    flat_id: flat.id,
                    wing: flat.wing,
                    floor: flat.floor,
                    flat_number: flat.flat_number,
                    frame_fixed: flat.frame_fixed,
                    pending_doors: pending,
                })
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wing_completion_groups_and_sorts() {
        let rows = vec![
            ("B".to_string(), true, false),
            ("A".to_string(), true, true),
            ("A".to_string(), false, false),
            ("A".to_string(), true, false),
            ("A".to_string(), true, true),
        ];
        let wings = wing_completion(&rows);
        assert_eq!(wings.len(), 2);
        assert_eq!(wings[0].wing, "A");
        assert_eq!(wings[0].total_flats, 4);
        assert_eq!(wings[0].frame_percent, Decimal::from(75));
        assert_eq!(wings[0].door_percent, Decimal::from(50));
        assert_eq!(wings[1].door_percent, Decimal::ZERO);
    }

    #[test]
    fn test_flat_input_reads_door_flags() {
        let input: CreateFlatInput = serde_json::from_value(serde_json::json!({
            "site_id": Uuid::nil(),
            "wing": "A",
            "floor": 3,
            "flat_number": "A-301",
            "main_door": true,
            "kitchen_door": true
        }))
        .unwrap();
        assert_eq!(input.doors.labels(), vec!["Main Door", "Kitchen Door"]);
    }

    #[test]
    fn test_fixing_status_uses_stored_labels() {
        let input: UpdateDoorFixingInput =
            serde_json::from_value(serde_json::json!({ "fixing_status": "On Hold" })).unwrap();
        assert_eq!(input.fixing_status, Some(FixingStatus::OnHold));
        assert!(serde_json::from_value::<UpdateDoorFixingInput>(serde_json::json!({
            "fixing_status": "Done"
        }))
        .is_err());
    }

    #[test]
    fn test_progress_defaults() {
        let input: CreateProgressInput =
            serde_json::from_value(serde_json::json!({ "site_id": Uuid::nil() })).unwrap();
        assert!(input.work_front_available);
        assert_eq!(input.frames_fixed_today, 0);
    }
}

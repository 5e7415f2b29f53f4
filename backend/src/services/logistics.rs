//! Fleet, vehicle assignments and delivery issues

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    dispatch_status_for, ensure_one_of, ensure_transition, is_on_time, on_time_percentage,
    AssignmentStatus, DeliveryIssueStatus, DeliveryIssueType, DispatchStatus, PaperStatus,
    TrackingStatus, Workflow,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{check_field, AppError, AppResult};
use crate::services::dispatch::{ensure_tracking, load_dispatch, move_dispatch, set_tracking_status};
use crate::services::production::move_paper;
use crate::services::status::{delete_row, lock_status};

#[derive(Clone)]
pub struct LogisticsService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Vehicle {
    pub id: Uuid,
    pub vehicle_number: String,
    pub vehicle_type: String,
    pub capacity: Option<String>,
    pub is_available: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateVehicleInput {
    pub vehicle_number: String,
    pub vehicle_type: String,
    pub capacity: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateVehicleInput {
    pub vehicle_type: Option<String>,
    pub capacity: Option<String>,
    pub is_available: Option<bool>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct VehicleFilter {
    pub available: Option<bool>,
}

const VEHICLE_COLUMNS: &str =
    "id, vehicle_number, vehicle_type, capacity, is_available, is_active, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Driver {
    pub id: Uuid,
    pub name: String,
    pub phone: Option<String>,
    pub license_number: String,
    pub user_id: Option<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDriverInput {
    pub name: String,
    pub phone: Option<String>,
    pub license_number: String,
    pub user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDriverInput {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub user_id: Option<Uuid>,
    pub is_active: Option<bool>,
}

const DRIVER_COLUMNS: &str =
    "id, name, phone, license_number, user_id, is_active, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct VehicleAssignment {
    pub id: Uuid,
    pub dispatch_id: Uuid,
    pub vehicle_id: Uuid,
    pub driver_id: Uuid,
    pub status: String,
    pub expected_delivery_date: Option<NaiveDate>,
    pub delivered_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub assigned_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AssignVehicleInput {
    pub dispatch_id: Uuid,
    pub vehicle_id: Uuid,
    pub driver_id: Uuid,
    pub expected_delivery_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAssignmentInput {
    pub vehicle_id: Option<Uuid>,
    pub driver_id: Option<Uuid>,
    pub status: Option<AssignmentStatus>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub delivered_date: Option<NaiveDate>,
    pub remarks: Option<String>,
}

const ASSIGNMENT_COLUMNS: &str = "id, dispatch_id, vehicle_id, driver_id, status, \
     expected_delivery_date, delivered_date, remarks, assigned_by, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DeliveryIssue {
    pub id: Uuid,
    pub dispatch_id: Uuid,
    pub assignment_id: Option<Uuid>,
    pub issue_type: String,
    pub description: String,
    pub status: String,
    pub resolution: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub reported_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReportIssueInput {
    pub dispatch_id: Uuid,
    pub issue_type: DeliveryIssueType,
    pub description: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateIssueInput {
    pub status: DeliveryIssueStatus,
    pub resolution: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IssueFilter {
    pub status: Option<String>,
    pub dispatch_id: Option<Uuid>,
}

const ISSUE_COLUMNS: &str = "id, dispatch_id, assignment_id, issue_type, description, status, \
     resolution, resolved_at, reported_by, created_at, updated_at";

#[derive(Debug, Serialize)]
pub struct LogisticsSummary {
    pub total_deliveries: i64,
    pub delivered: i64,
    pub delayed: i64,
    pub on_time_percentage: Decimal,
    pub active_vehicles: i64,
    pub vehicles_in_use: i64,
    pub vehicle_utilisation: Decimal,
    pub open_issues: i64,
}

/// Share of active vehicles currently out on a delivery, two decimals
fn utilisation(in_use: i64, active: i64) -> Decimal {
    if active <= 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(in_use) * Decimal::ONE_HUNDRED / Decimal::from(active)).round_dp(2)
}

/// Reserve a vehicle for a delivery, failing unless it is active and free
async fn reserve_vehicle(conn: &mut PgConnection, vehicle_id: Uuid) -> AppResult<String> {
    let (number, available, active) = sqlx::query_as::<_, (String, bool, bool)>(
        "SELECT vehicle_number, is_available, is_active FROM vehicles WHERE id = $1 FOR UPDATE",
    )
    .bind(vehicle_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::BusinessRule("Vehicle does not exist".to_string()))?;
    if !available || !active {
        return Err(AppError::BusinessRule(format!("Vehicle {} is not available", number)));
    }

    sqlx::query("UPDATE vehicles SET is_available = FALSE, updated_at = NOW() WHERE id = $1")
        .bind(vehicle_id)
        .execute(&mut *conn)
        .await?;
    Ok(number)
}

async fn release_vehicle(conn: &mut PgConnection, vehicle_id: Uuid) -> AppResult<()> {
    sqlx::query("UPDATE vehicles SET is_available = TRUE, updated_at = NOW() WHERE id = $1")
        .bind(vehicle_id)
        .execute(conn)
        .await?;
    Ok(())
}

async fn active_driver(conn: &mut PgConnection, driver_id: Uuid) -> AppResult<(String, Option<String>)> {
    let (name, phone, active) = sqlx::query_as::<_, (String, Option<String>, bool)>(
        "SELECT name, phone, is_active FROM drivers WHERE id = $1",
    )
    .bind(driver_id)
    .fetch_optional(conn)
    .await?
    .ok_or_else(|| AppError::BusinessRule("Driver does not exist".to_string()))?;
    if !active {
        return Err(AppError::BusinessRule(format!("Driver {} is not active", name)));
    }
    Ok((name, phone))
}

async fn load_assignment(conn: &mut PgConnection, id: Uuid) -> AppResult<VehicleAssignment> {
    let sql = format!("SELECT {ASSIGNMENT_COLUMNS} FROM vehicle_assignments WHERE id = $1");
    sqlx::query_as::<_, VehicleAssignment>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Vehicle assignment".to_string()))
}

impl LogisticsService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ---- Vehicles ----

    pub async fn list_vehicles(&self, filter: VehicleFilter) -> AppResult<Vec<Vehicle>> {
        let sql = format!(
            "SELECT {VEHICLE_COLUMNS} FROM vehicles \
             WHERE ($1::bool IS NULL OR is_available = $1) ORDER BY vehicle_number"
        );
        let vehicles = sqlx::query_as::<_, Vehicle>(&sql)
            .bind(filter.available)
            .fetch_all(&self.db)
            .await?;
        Ok(vehicles)
    }

    pub async fn get_vehicle(&self, id: Uuid) -> AppResult<Vehicle> {
        let sql = format!("SELECT {VEHICLE_COLUMNS} FROM vehicles WHERE id = $1");
        sqlx::query_as::<_, Vehicle>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))
    }

    pub async fn create_vehicle(&self, input: CreateVehicleInput) -> AppResult<Vehicle> {
        check_field("vehicle_number", shared::validate_non_empty(&input.vehicle_number))?;
        check_field("vehicle_type", shared::validate_non_empty(&input.vehicle_type))?;

        let sql = format!(
            "INSERT INTO vehicles (vehicle_number, vehicle_type, capacity) VALUES ($1, $2, $3) \
             RETURNING {VEHICLE_COLUMNS}"
        );
        let vehicle = sqlx::query_as::<_, Vehicle>(&sql)
            .bind(input.vehicle_number.trim().to_uppercase())
            .bind(input.vehicle_type)
            .bind(input.capacity)
            .fetch_one(&self.db)
            .await?;
        tracing::info!(vehicle = %vehicle.vehicle_number, "Vehicle registered");
        Ok(vehicle)
    }

    pub async fn update_vehicle(&self, id: Uuid, input: UpdateVehicleInput) -> AppResult<Vehicle> {
        let sql = format!(
            r#"
            UPDATE vehicles SET
                vehicle_type = COALESCE($2, vehicle_type),
                capacity = COALESCE($3, capacity),
                is_available = COALESCE($4, is_available),
                is_active = COALESCE($5, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {VEHICLE_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Vehicle>(&sql)
            .bind(id)
            .bind(input.vehicle_type)
            .bind(input.capacity)
            .bind(input.is_available)
            .bind(input.is_active)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Vehicle".to_string()))
    }

    pub async fn delete_vehicle(&self, id: Uuid) -> AppResult<()> {
        delete_row(&self.db, "vehicles", id, "Vehicle").await
    }

    // ---- Drivers ----

    pub async fn list_drivers(&self) -> AppResult<Vec<Driver>> {
        let sql = format!("SELECT {DRIVER_COLUMNS} FROM drivers ORDER BY name");
        let drivers = sqlx::query_as::<_, Driver>(&sql).fetch_all(&self.db).await?;
        Ok(drivers)
    }

    pub async fn get_driver(&self, id: Uuid) -> AppResult<Driver> {
        let sql = format!("SELECT {DRIVER_COLUMNS} FROM drivers WHERE id = $1");
        sqlx::query_as::<_, Driver>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Driver".to_string()))
    }

    pub async fn create_driver(&self, input: CreateDriverInput) -> AppResult<Driver> {
        check_field("name", shared::validate_non_empty(&input.name))?;
        check_field("license_number", shared::validate_non_empty(&input.license_number))?;
        if let Some(phone) = &input.phone {
            check_field("phone", shared::validate_indian_mobile(phone))?;
        }

        let sql = format!(
            "INSERT INTO drivers (name, phone, license_number, user_id) VALUES ($1, $2, $3, $4) \
             RETURNING {DRIVER_COLUMNS}"
        );
        let driver = sqlx::query_as::<_, Driver>(&sql)
            .bind(input.name)
            .bind(input.phone)
            .bind(input.license_number)
            .bind(input.user_id)
            .fetch_one(&self.db)
            .await?;
        Ok(driver)
    }

    pub async fn update_driver(&self, id: Uuid, input: UpdateDriverInput) -> AppResult<Driver> {
        if let Some(phone) = &input.phone {
            check_field("phone", shared::validate_indian_mobile(phone))?;
        }
        let sql = format!(
            r#"
            UPDATE drivers SET
                name = COALESCE($2, name),
                phone = COALESCE($3, phone),
                user_id = COALESCE($4, user_id),
                is_active = COALESCE($5, is_active),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {DRIVER_COLUMNS}
            "#
        );
        sqlx::query_as::<_, Driver>(&sql)
            .bind(id)
            .bind(input.name)
            .bind(input.phone)
            .bind(input.user_id)
            .bind(input.is_active)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Driver".to_string()))
    }

    pub async fn delete_driver(&self, id: Uuid) -> AppResult<()> {
        delete_row(&self.db, "drivers", id, "Driver").await
    }

    // ---- Assignments ----

    pub async fn list_assignments(&self, status: Option<String>) -> AppResult<Vec<VehicleAssignment>> {
        let sql = format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM vehicle_assignments \
             WHERE ($1::text IS NULL OR status = $1) ORDER BY created_at DESC"
        );
        let assignments = sqlx::query_as::<_, VehicleAssignment>(&sql)
            .bind(status)
            .fetch_all(&self.db)
            .await?;
        Ok(assignments)
    }

    pub async fn get_assignment(&self, id: Uuid) -> AppResult<VehicleAssignment> {
        let mut conn = self.db.acquire().await?;
        load_assignment(&mut conn, id).await
    }

    /// Put a vehicle and driver on an approved dispatch.
    ///
    /// The vehicle is reserved, the dispatch leaves the yard and tracking
    /// starts, all in one transaction.
    pub async fn assign_vehicle(&self, user_id: Uuid, input: AssignVehicleInput) -> AppResult<VehicleAssignment> {
        let mut tx = self.db.begin().await?;
        let dispatch_status: DispatchStatus =
            lock_status(&mut tx, "dispatches", input.dispatch_id, "Dispatch").await?;
        ensure_one_of(dispatch_status, DispatchStatus::ASSIGNABLE)?;

        let taken = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM vehicle_assignments WHERE dispatch_id = $1)",
        )
        .bind(input.dispatch_id)
        .fetch_one(&mut *tx)
        .await?;
        if taken {
            return Err(AppError::BusinessRule("Dispatch already has a vehicle assigned".to_string()));
        }

        let vehicle_number = reserve_vehicle(&mut tx, input.vehicle_id).await?;
        let (driver_name, driver_phone) = active_driver(&mut tx, input.driver_id).await?;

        let sql = format!(
            r#"
            INSERT INTO vehicle_assignments (dispatch_id, vehicle_id, driver_id, status,
                                             expected_delivery_date, remarks, assigned_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        let assignment = sqlx::query_as::<_, VehicleAssignment>(&sql)
            .bind(input.dispatch_id)
            .bind(input.vehicle_id)
            .bind(input.driver_id)
            .bind(AssignmentStatus::Assigned.as_str())
            .bind(input.expected_delivery_date)
            .bind(input.remarks)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            UPDATE dispatches SET
                vehicle_number = $2, driver_name = $3, driver_phone = $4,
                expected_delivery_date = COALESCE($5, expected_delivery_date),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(input.dispatch_id)
        .bind(&vehicle_number)
        .bind(&driver_name)
        .bind(driver_phone)
        .bind(input.expected_delivery_date)
        .execute(&mut *tx)
        .await?;

        move_dispatch(&mut tx, input.dispatch_id, DispatchStatus::Dispatched).await?;
        let dispatch = load_dispatch(&mut tx, input.dispatch_id).await?;
        ensure_tracking(&mut tx, dispatch.id, dispatch.expected_delivery_date, user_id).await?;
        if dispatch_status == DispatchStatus::Approved {
            move_paper(&mut tx, dispatch.production_paper_id, PaperStatus::Dispatched).await?;
        }

        tx.commit().await?;
        tracing::info!(
            dispatch = %dispatch.dispatch_number,
            vehicle = %vehicle_number,
            driver = %driver_name,
            "Vehicle assigned"
        );
        Ok(assignment)
    }

    pub async fn update_assignment(
        &self,
        user_id: Uuid,
        id: Uuid,
        input: UpdateAssignmentInput,
    ) -> AppResult<VehicleAssignment> {
        let mut tx = self.db.begin().await?;
        let current: AssignmentStatus = lock_status(&mut tx, "vehicle_assignments", id, "Vehicle assignment").await?;
        let existing = load_assignment(&mut tx, id).await?;
        if current.is_terminal() && (input.vehicle_id.is_some() || input.driver_id.is_some()) {
            return Err(AppError::BusinessRule(format!("Assignment is already {}", current)));
        }

        if let Some(vehicle_id) = input.vehicle_id.filter(|v| *v != existing.vehicle_id) {
            release_vehicle(&mut tx, existing.vehicle_id).await?;
            let number = reserve_vehicle(&mut tx, vehicle_id).await?;
            sqlx::query("UPDATE dispatches SET vehicle_number = $2, updated_at = NOW() WHERE id = $1")
                .bind(existing.dispatch_id)
                .bind(&number)
                .execute(&mut *tx)
                .await?;
            tracing::info!(assignment = %id, vehicle = %number, "Vehicle swapped");
        }
        if let Some(driver_id) = input.driver_id {
            active_driver(&mut tx, driver_id).await?;
        }

        let next = input.status.filter(|s| *s != current);
        if let Some(next) = next {
            ensure_transition(current, next)?;
        }

        let sql = format!(
            r#"
            UPDATE vehicle_assignments SET
                vehicle_id = COALESCE($2, vehicle_id),
                driver_id = COALESCE($3, driver_id),
                status = COALESCE($4, status),
                expected_delivery_date = COALESCE($5, expected_delivery_date),
                delivered_date = CASE WHEN $4 = 'delivered' THEN COALESCE($6, CURRENT_DATE) ELSE delivered_date END,
                remarks = COALESCE($7, remarks),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ASSIGNMENT_COLUMNS}
            "#
        );
        let assignment = sqlx::query_as::<_, VehicleAssignment>(&sql)
            .bind(id)
            .bind(input.vehicle_id)
            .bind(input.driver_id)
            .bind(next.map(|s| s.as_str()))
            .bind(input.expected_delivery_date)
            .bind(input.delivered_date)
            .bind(input.remarks)
            .fetch_one(&mut *tx)
            .await?;

        if let Some(next) = next {
            if next.releases_vehicle() {
                release_vehicle(&mut tx, assignment.vehicle_id).await?;
            }
            let tracking = match next {
                AssignmentStatus::InTransit => Some(TrackingStatus::InTransit),
                AssignmentStatus::Delayed => Some(TrackingStatus::Delayed),
                AssignmentStatus::Delivered => Some(TrackingStatus::Delivered),
                AssignmentStatus::Assigned | AssignmentStatus::Cancelled => None,
            };
            if let Some(tracking) = tracking {
                sync_delivery(&mut tx, assignment.dispatch_id, tracking, assignment.delivered_date, user_id)
                    .await?;
            }
            tracing::info!(assignment = %id, from = %current, to = %next, "Assignment status changed");
        }

        tx.commit().await?;
        Ok(assignment)
    }

    // ---- Delivery issues ----

    pub async fn list_issues(&self, filter: IssueFilter) -> AppResult<Vec<DeliveryIssue>> {
        let sql = format!(
            "SELECT {ISSUE_COLUMNS} FROM delivery_issues \
             WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR dispatch_id = $2) \
             ORDER BY created_at DESC"
        );
        let issues = sqlx::query_as::<_, DeliveryIssue>(&sql)
            .bind(filter.status)
            .bind(filter.dispatch_id)
            .fetch_all(&self.db)
            .await?;
        Ok(issues)
    }

    /// Record a delivery problem. A delay puts the assignment, tracking and
    /// dispatch into `delayed`.
    pub async fn report_issue(&self, user_id: Uuid, input: ReportIssueInput) -> AppResult<DeliveryIssue> {
        check_field("description", shared::validate_non_empty(&input.description))?;

        let mut tx = self.db.begin().await?;
        let dispatch = load_dispatch(&mut tx, input.dispatch_id).await?;
        let assignment_id = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM vehicle_assignments WHERE dispatch_id = $1",
        )
        .bind(dispatch.id)
        .fetch_optional(&mut *tx)
        .await?;

        let sql = format!(
            r#"
            INSERT INTO delivery_issues (dispatch_id, assignment_id, issue_type, description, status, reported_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {ISSUE_COLUMNS}
            "#
        );
        let issue = sqlx::query_as::<_, DeliveryIssue>(&sql)
            .bind(dispatch.id)
            .bind(assignment_id)
            .bind(input.issue_type.as_str())
            .bind(&input.description)
            .bind(DeliveryIssueStatus::Open.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        if input.issue_type == DeliveryIssueType::DeliveryDelay {
            if let Some(assignment_id) = assignment_id {
                let current: AssignmentStatus =
                    lock_status(&mut tx, "vehicle_assignments", assignment_id, "Vehicle assignment").await?;
                if current != AssignmentStatus::Delayed {
                    ensure_transition(current, AssignmentStatus::Delayed)?;
                    sqlx::query("UPDATE vehicle_assignments SET status = $2, updated_at = NOW() WHERE id = $1")
                        .bind(assignment_id)
                        .bind(AssignmentStatus::Delayed.as_str())
                        .execute(&mut *tx)
                        .await?;
                }
            }
            sync_delivery(&mut tx, dispatch.id, TrackingStatus::Delayed, None, user_id).await?;
            tracing::warn!(dispatch = %dispatch.dispatch_number, "Delivery delayed");
        }

        tx.commit().await?;
        Ok(issue)
    }

    pub async fn update_issue(&self, id: Uuid, input: UpdateIssueInput) -> AppResult<DeliveryIssue> {
        let mut tx = self.db.begin().await?;
        let current: DeliveryIssueStatus = lock_status(&mut tx, "delivery_issues", id, "Delivery issue").await?;
        if current != input.status {
            ensure_transition(current, input.status)?;
        }

        let sql = format!(
            r#"
            UPDATE delivery_issues SET
                status = $2,
                resolution = COALESCE($3, resolution),
                resolved_at = CASE WHEN $2 = 'resolved' THEN COALESCE(resolved_at, NOW()) ELSE resolved_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {ISSUE_COLUMNS}
            "#
        );
        let issue = sqlx::query_as::<_, DeliveryIssue>(&sql)
            .bind(id)
            .bind(input.status.as_str())
            .bind(input.resolution)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(issue)
    }

    // ---- Reports ----

    pub async fn summary(&self) -> AppResult<LogisticsSummary> {
        let (total_deliveries, delivered, delayed) = sqlx::query_as::<_, (i64, i64, i64)>(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'delivered'),
                   COUNT(*) FILTER (WHERE status = 'delayed')
            FROM delivery_tracking
            "#,
        )
        .fetch_one(&self.db)
        .await?;

        let delivered_dates = sqlx::query_as::<_, (Option<NaiveDate>, Option<NaiveDate>)>(
            "SELECT delivered_date, expected_delivery_date FROM delivery_tracking WHERE status = $1",
        )
        .bind(TrackingStatus::Delivered.as_str())
        .fetch_all(&self.db)
        .await?;
        let on_time = delivered_dates
            .iter()
            .filter(|(delivered_on, expected)| is_on_time(*delivered_on, *expected))
            .count() as i64;

        let (active_vehicles, vehicles_in_use) = sqlx::query_as::<_, (i64, i64)>(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE NOT is_available) FROM vehicles WHERE is_active",
        )
        .fetch_one(&self.db)
        .await?;

        let open_issues = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM delivery_issues WHERE status <> $1",
        )
        .bind(DeliveryIssueStatus::Resolved.as_str())
        .fetch_one(&self.db)
        .await?;

        Ok(LogisticsSummary {
            total_deliveries,
            delivered,
            delayed,
            on_time_percentage: on_time_percentage(on_time, delivered),
            active_vehicles,
            vehicles_in_use,
            vehicle_utilisation: utilisation(vehicles_in_use, active_vehicles),
            open_issues,
        })
    }
}

/// Bring tracking and the dispatch in line with a delivery event
async fn sync_delivery(
    conn: &mut PgConnection,
    dispatch_id: Uuid,
    next: TrackingStatus,
    delivered_date: Option<NaiveDate>,
    user_id: Uuid,
) -> AppResult<()> {
    let dispatch = load_dispatch(&mut *conn, dispatch_id).await?;
    ensure_tracking(&mut *conn, dispatch_id, dispatch.expected_delivery_date, user_id).await?;
    set_tracking_status(&mut *conn, dispatch_id, next, delivered_date, user_id).await?;

    move_dispatch(conn, dispatch_id, dispatch_status_for(next)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilisation() {
        assert_eq!(utilisation(0, 0), Decimal::ZERO);
        assert_eq!(utilisation(3, 4), Decimal::from(75));
        assert_eq!(utilisation(1, 3).to_string(), "33.33");
    }

    #[test]
    fn test_delay_reachable_from_open_assignments() {
        for status in [AssignmentStatus::Assigned, AssignmentStatus::InTransit] {
            assert!(ensure_transition(status, AssignmentStatus::Delayed).is_ok());
        }
        assert!(ensure_transition(AssignmentStatus::Cancelled, AssignmentStatus::Delayed).is_err());
    }

    #[test]
    fn test_issue_payload_uses_snake_case_types() {
        let input: ReportIssueInput = serde_json::from_str(
            r#"{"dispatch_id":"6f1c1bde-5a4e-4a8e-9f57-0e5c1f0c2b11","issue_type":"delivery_delay","description":"Stuck at toll"}"#,
        )
        .unwrap();
        assert_eq!(input.issue_type, DeliveryIssueType::DeliveryDelay);
    }
}

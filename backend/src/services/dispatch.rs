//! Dispatch notes, gate passes and delivery tracking

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    dispatch_status_for, ensure_one_of, ensure_transition, numbering, summarize_items,
    BillingRequestStatus, DispatchItem, DispatchStatus, GatePassSummary, PaperStatus, StatusCount,
    TrackingStatus,
};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{check_field, AppError, AppResult};
use crate::services::billing::{BillingRequest, REQUEST_COLUMNS};
use crate::services::numbering::next_number;
use crate::services::production::{has_approved_qc, move_paper, ProductionPaper, PAPER_COLUMNS};
use crate::services::status::lock_status;

#[derive(Clone)]
pub struct DispatchService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Dispatch {
    pub id: Uuid,
    pub dispatch_number: String,
    pub production_paper_id: Uuid,
    pub production_paper_number: String,
    pub billing_request_id: Option<Uuid>,
    pub dc_number: Option<String>,
    pub invoice_number: Option<String>,
    pub party_id: Uuid,
    pub party_name: String,
    pub delivery_address: Option<String>,
    pub dispatch_date: NaiveDate,
    pub expected_delivery_date: Option<NaiveDate>,
    pub vehicle_number: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub items: Json<Vec<DispatchItem>>,
    pub qc_approved: bool,
    pub status: String,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub dispatched_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub remarks: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDispatchInput {
    pub production_paper_id: Uuid,
    pub billing_request_id: Option<Uuid>,
    pub delivery_address: Option<String>,
    pub dispatch_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub vehicle_number: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub items: Vec<DispatchItem>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDispatchInput {
    pub delivery_address: Option<String>,
    pub dispatch_date: Option<NaiveDate>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub vehicle_number: Option<String>,
    pub driver_name: Option<String>,
    pub driver_phone: Option<String>,
    pub items: Option<Vec<DispatchItem>>,
    pub remarks: Option<String>,
}

pub(crate) const DISPATCH_COLUMNS: &str = "id, dispatch_number, production_paper_id, \
     production_paper_number, billing_request_id, dc_number, invoice_number, party_id, party_name, \
     delivery_address, dispatch_date, expected_delivery_date, vehicle_number, driver_name, \
     driver_phone, items, qc_approved, status, approved_by, approved_at, dispatched_at, \
     delivered_at, remarks, created_by, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct GatePass {
    pub id: Uuid,
    pub gate_pass_number: String,
    pub dispatch_id: Uuid,
    pub vehicle_number: Option<String>,
    pub driver_name: Option<String>,
    pub items_summary: Json<GatePassSummary>,
    pub issued_by: Uuid,
    pub issued_at: DateTime<Utc>,
    pub verified_by: Option<Uuid>,
    pub verified_at: Option<DateTime<Utc>>,
}

const GATE_PASS_COLUMNS: &str = "id, gate_pass_number, dispatch_id, vehicle_number, driver_name, \
     items_summary, issued_by, issued_at, verified_by, verified_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DeliveryTracking {
    pub id: Uuid,
    pub dispatch_id: Uuid,
    pub status: String,
    pub current_location: Option<String>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub delivered_date: Option<NaiveDate>,
    pub received_by: Option<String>,
    pub remarks: Option<String>,
    pub updated_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTrackingInput {
    pub status: Option<TrackingStatus>,
    pub current_location: Option<String>,
    pub expected_delivery_date: Option<NaiveDate>,
    pub delivered_date: Option<NaiveDate>,
    pub received_by: Option<String>,
    pub remarks: Option<String>,
}

const TRACKING_COLUMNS: &str = "id, dispatch_id, status, current_location, expected_delivery_date, \
     delivered_date, received_by, remarks, updated_by, created_at, updated_at";

#[derive(Debug, Deserialize)]
pub struct DispatchFilter {
    pub status: Option<String>,
    pub party_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct DispatchDashboard {
    pub by_status: Vec<StatusCount>,
    pub ready_for_dispatch: i64,
    pub in_transit: i64,
    pub delivered_today: i64,
    pub unverified_gate_passes: i64,
}

fn check_items(items: &[DispatchItem]) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::validation("items", "At least one item is required"));
    }
    for item in items {
        check_field("items.product_description", shared::validate_non_empty(&item.product_description))?;
        check_field("items.quantity", shared::validate_positive(item.quantity))?;
    }
    Ok(())
}

pub(crate) async fn load_dispatch(conn: &mut PgConnection, id: Uuid) -> AppResult<Dispatch> {
    let sql = format!("SELECT {DISPATCH_COLUMNS} FROM dispatches WHERE id = $1");
    sqlx::query_as::<_, Dispatch>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Dispatch".to_string()))
}

/// Move a dispatch along its workflow, stamping dispatched/delivered times.
///
/// A dispatch already in `next` is left untouched. An approved dispatch that
/// is delivered is first marked dispatched, and its paper with it.
pub(crate) async fn move_dispatch(
    conn: &mut PgConnection,
    dispatch_id: Uuid,
    next: DispatchStatus,
) -> AppResult<DispatchStatus> {
    let current: DispatchStatus = lock_status(&mut *conn, "dispatches", dispatch_id, "Dispatch").await?;
    let mut from = current;
    for step in current.route_to(next) {
        ensure_transition(from, step)?;
        sqlx::query(
            r#"
            UPDATE dispatches SET
                status = $2,
                dispatched_at = CASE WHEN $2 = 'dispatched' THEN COALESCE(dispatched_at, NOW()) ELSE dispatched_at END,
                delivered_at = CASE WHEN $2 = 'delivered' THEN NOW() ELSE delivered_at END,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(dispatch_id)
        .bind(step.as_str())
        .execute(&mut *conn)
        .await?;
        tracing::info!(%dispatch_id, from = %from, to = %step, "Dispatch status changed");

        match step {
            DispatchStatus::Dispatched => {
                let paper_id = dispatch_paper_id(conn, dispatch_id).await?;
                move_paper_if_ready(conn, paper_id).await?;
            }
            DispatchStatus::Delivered => deliver_paper(conn, dispatch_id).await?,
            _ => {}
        }
        from = step;
    }
    Ok(current)
}

async fn dispatch_paper_id(conn: &mut PgConnection, dispatch_id: Uuid) -> AppResult<Uuid> {
    let paper_id = sqlx::query_scalar::<_, Uuid>("SELECT production_paper_id FROM dispatches WHERE id = $1")
        .bind(dispatch_id)
        .fetch_one(conn)
        .await?;
    Ok(paper_id)
}

/// Mark the dispatched paper delivered, passing through `dispatched` if the
/// goods were delivered straight from a delay
async fn deliver_paper(conn: &mut PgConnection, dispatch_id: Uuid) -> AppResult<()> {
    let paper_id = dispatch_paper_id(conn, dispatch_id).await?;
    let current = move_paper_if_ready(conn, paper_id).await?;
    if current != PaperStatus::Delivered {
        move_paper(conn, paper_id, PaperStatus::Delivered).await?;
    }
    Ok(())
}

async fn move_paper_if_ready(conn: &mut PgConnection, paper_id: Uuid) -> AppResult<PaperStatus> {
    let current: PaperStatus = lock_status(&mut *conn, "production_papers", paper_id, "Production paper").await?;
    if current == PaperStatus::ReadyForDispatch {
        move_paper(conn, paper_id, PaperStatus::Dispatched).await?;
        return Ok(PaperStatus::Dispatched);
    }
    Ok(current)
}

/// Create the tracking record for a dispatch unless one exists
pub(crate) async fn ensure_tracking(
    conn: &mut PgConnection,
    dispatch_id: Uuid,
    expected_delivery_date: Option<NaiveDate>,
    user_id: Uuid,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO delivery_tracking (dispatch_id, status, expected_delivery_date, updated_by)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (dispatch_id) DO NOTHING
        "#,
    )
    .bind(dispatch_id)
    .bind(TrackingStatus::InTransit.as_str())
    .bind(expected_delivery_date)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(())
}

/// Set the tracking status of a dispatch, recording `delivered_date` on delivery
pub(crate) async fn set_tracking_status(
    conn: &mut PgConnection,
    dispatch_id: Uuid,
    next: TrackingStatus,
    delivered_date: Option<NaiveDate>,
    user_id: Uuid,
) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE delivery_tracking SET
            status = $2,
            delivered_date = CASE WHEN $2 = 'delivered' THEN COALESCE($3, CURRENT_DATE) ELSE delivered_date END,
            updated_by = $4,
            updated_at = NOW()
        WHERE dispatch_id = $1
        "#,
    )
    .bind(dispatch_id)
    .bind(next.as_str())
    .bind(delivered_date)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(())
}

impl DispatchService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_dispatches(&self, filter: DispatchFilter) -> AppResult<Vec<Dispatch>> {
        let sql = format!(
            "SELECT {DISPATCH_COLUMNS} FROM dispatches \
             WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR party_id = $2) \
             ORDER BY created_at DESC"
        );
        let dispatches = sqlx::query_as::<_, Dispatch>(&sql)
            .bind(filter.status)
            .bind(filter.party_id)
            .fetch_all(&self.db)
            .await?;
        Ok(dispatches)
    }

    pub async fn get_dispatch(&self, id: Uuid) -> AppResult<Dispatch> {
        let mut conn = self.db.acquire().await?;
        load_dispatch(&mut conn, id).await
    }

    pub async fn create_dispatch(&self, user_id: Uuid, input: CreateDispatchInput) -> AppResult<Dispatch> {
        check_items(&input.items)?;

        let mut tx = self.db.begin().await?;
        let sql = format!("SELECT {PAPER_COLUMNS} FROM production_papers WHERE id = $1 AND NOT is_deleted");
        let paper = sqlx::query_as::<_, ProductionPaper>(&sql)
            .bind(input.production_paper_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Production paper".to_string()))?;
        if !has_approved_qc(&mut tx, paper.id).await? {
            return Err(AppError::BusinessRule(format!(
                "Production paper {} has no approved quality check",
                paper.paper_number
            )));
        }

        let (dc_number, invoice_number, site_address) = match input.billing_request_id {
            Some(request_id) => {
                let sql = format!("SELECT {REQUEST_COLUMNS} FROM billing_requests WHERE id = $1");
                let request = sqlx::query_as::<_, BillingRequest>(&sql)
                    .bind(request_id)
                    .fetch_optional(&mut *tx)
                    .await?
                    .ok_or_else(|| AppError::NotFound("Billing request".to_string()))?;
                let status: BillingRequestStatus = shared::parse_status(&request.status)?;
                ensure_one_of(
                    status,
                    &[BillingRequestStatus::BillingApproved, BillingRequestStatus::SentToDispatch],
                )?;

                let dc_number = sqlx::query_scalar::<_, String>(
                    "SELECT dc_number FROM delivery_challans WHERE billing_request_id = $1 \
                     ORDER BY created_at DESC LIMIT 1",
                )
                .bind(request_id)
                .fetch_optional(&mut *tx)
                .await?;
                let invoice_number = sqlx::query_scalar::<_, String>(
                    "SELECT invoice_number FROM tax_invoices WHERE billing_request_id = $1 \
                     ORDER BY created_at DESC LIMIT 1",
                )
                .bind(request_id)
                .fetch_optional(&mut *tx)
                .await?;
                (dc_number, invoice_number, request.site_address)
            }
            None => (None, None, None),
        };

        let number = next_number(&mut tx, "dispatches", "dispatch_number", numbering::DISPATCH).await?;
        let sql = format!(
            r#"
            INSERT INTO dispatches (
                dispatch_number, production_paper_id, production_paper_number, billing_request_id,
                dc_number, invoice_number, party_id, party_name, delivery_address, dispatch_date,
                expected_delivery_date, vehicle_number, driver_name, driver_phone, items,
                qc_approved, status, remarks, created_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, COALESCE($10, CURRENT_DATE), $11, $12, $13,
                    $14, $15, TRUE, $16, $17, $18)
            RETURNING {DISPATCH_COLUMNS}
            "#
        );
        let dispatch = sqlx::query_as::<_, Dispatch>(&sql)
            .bind(&number)
            .bind(paper.id)
            .bind(&paper.paper_number)
            .bind(input.billing_request_id)
            .bind(dc_number)
            .bind(invoice_number)
            .bind(paper.party_id)
            .bind(&paper.party_name)
            .bind(input.delivery_address.or(site_address))
            .bind(input.dispatch_date)
            .bind(input.expected_delivery_date)
            .bind(input.vehicle_number)
            .bind(input.driver_name)
            .bind(input.driver_phone)
            .bind(Json(&input.items))
            .bind(DispatchStatus::Draft.as_str())
            .bind(input.remarks)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(dispatch = %number, paper = %paper.paper_number, "Dispatch created");
        Ok(dispatch)
    }

    pub async fn update_dispatch(&self, id: Uuid, input: UpdateDispatchInput) -> AppResult<Dispatch> {
        if let Some(items) = &input.items {
            check_items(items)?;
        }

        let mut tx = self.db.begin().await?;
        let current: DispatchStatus = lock_status(&mut tx, "dispatches", id, "Dispatch").await?;
        ensure_one_of(current, DispatchStatus::EDITABLE)?;

        let sql = format!(
            r#"
            UPDATE dispatches SET
                delivery_address = COALESCE($2, delivery_address),
                dispatch_date = COALESCE($3, dispatch_date),
                expected_delivery_date = COALESCE($4, expected_delivery_date),
                vehicle_number = COALESCE($5, vehicle_number),
                driver_name = COALESCE($6, driver_name),
                driver_phone = COALESCE($7, driver_phone),
                items = COALESCE($8, items),
                remarks = COALESCE($9, remarks),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {DISPATCH_COLUMNS}
            "#
        );
        let dispatch = sqlx::query_as::<_, Dispatch>(&sql)
            .bind(id)
            .bind(input.delivery_address)
            .bind(input.dispatch_date)
            .bind(input.expected_delivery_date)
            .bind(input.vehicle_number)
            .bind(input.driver_name)
            .bind(input.driver_phone)
            .bind(input.items.as_ref().map(Json))
            .bind(input.remarks)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(dispatch)
    }

    /// Approve a draft dispatch and issue its gate pass
    pub async fn approve_dispatch(&self, approver: Uuid, id: Uuid) -> AppResult<(Dispatch, GatePass)> {
        let mut tx = self.db.begin().await?;
        let current: DispatchStatus = lock_status(&mut tx, "dispatches", id, "Dispatch").await?;
        ensure_transition(current, DispatchStatus::Approved)?;

        let sql = format!(
            r#"
            UPDATE dispatches SET status = $2, approved_by = $3, approved_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {DISPATCH_COLUMNS}
            "#
        );
        let dispatch = sqlx::query_as::<_, Dispatch>(&sql)
            .bind(id)
            .bind(DispatchStatus::Approved.as_str())
            .bind(approver)
            .fetch_one(&mut *tx)
            .await?;

        let summary = summarize_items(&dispatch.items);
        let number = next_number(&mut tx, "gate_passes", "gate_pass_number", numbering::GATE_PASS).await?;
        let sql = format!(
            r#"
            INSERT INTO gate_passes (gate_pass_number, dispatch_id, vehicle_number, driver_name,
                                     items_summary, issued_by)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {GATE_PASS_COLUMNS}
            "#
        );
        let gate_pass = sqlx::query_as::<_, GatePass>(&sql)
            .bind(&number)
            .bind(dispatch.id)
            .bind(&dispatch.vehicle_number)
            .bind(&dispatch.driver_name)
            .bind(Json(&summary))
            .bind(approver)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(
            dispatch = %dispatch.dispatch_number,
            gate_pass = %number,
            lines = summary.line_count,
            "Dispatch approved"
        );
        Ok((dispatch, gate_pass))
    }

    /// Goods have left the yard: start tracking and move the paper along
    pub async fn mark_dispatched(&self, user_id: Uuid, id: Uuid) -> AppResult<Dispatch> {
        let mut tx = self.db.begin().await?;
        let current: DispatchStatus = lock_status(&mut tx, "dispatches", id, "Dispatch").await?;
        ensure_one_of(current, &[DispatchStatus::Approved])?;
        move_dispatch(&mut tx, id, DispatchStatus::Dispatched).await?;

        let dispatch = load_dispatch(&mut tx, id).await?;
        ensure_tracking(&mut tx, id, dispatch.expected_delivery_date, user_id).await?;
        move_paper(&mut tx, dispatch.production_paper_id, PaperStatus::Dispatched).await?;

        tx.commit().await?;
        Ok(dispatch)
    }

    pub async fn get_gate_pass(&self, number: &str) -> AppResult<GatePass> {
        let sql = format!("SELECT {GATE_PASS_COLUMNS} FROM gate_passes WHERE gate_pass_number = $1");
        sqlx::query_as::<_, GatePass>(&sql)
            .bind(number)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Gate pass".to_string()))
    }

    pub async fn verify_gate_pass(&self, user_id: Uuid, number: &str) -> AppResult<GatePass> {
        let sql = format!(
            r#"
            UPDATE gate_passes SET verified_by = $2, verified_at = NOW()
            WHERE gate_pass_number = $1 AND verified_at IS NULL
            RETURNING {GATE_PASS_COLUMNS}
            "#
        );
        let verified = sqlx::query_as::<_, GatePass>(&sql)
            .bind(number)
            .bind(user_id)
            .fetch_optional(&self.db)
            .await?;

        match verified {
            Some(pass) => {
                tracing::info!(gate_pass = %number, %user_id, "Gate pass verified");
                Ok(pass)
            }
            None => {
                // Distinguish a missing pass from one verified earlier
                self.get_gate_pass(number).await?;
                Err(AppError::BusinessRule(format!("Gate pass {} is already verified", number)))
            }
        }
    }

    pub async fn get_tracking(&self, dispatch_id: Uuid) -> AppResult<DeliveryTracking> {
        let sql = format!("SELECT {TRACKING_COLUMNS} FROM delivery_tracking WHERE dispatch_id = $1");
        sqlx::query_as::<_, DeliveryTracking>(&sql)
            .bind(dispatch_id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Delivery tracking".to_string()))
    }

    /// Update tracking for a dispatch, creating the record when missing.
    /// The dispatch status follows the tracking status.
    pub async fn update_tracking(
        &self,
        user_id: Uuid,
        dispatch_id: Uuid,
        input: UpdateTrackingInput,
    ) -> AppResult<DeliveryTracking> {
        let mut tx = self.db.begin().await?;
        let dispatch = load_dispatch(&mut tx, dispatch_id).await?;
        ensure_tracking(&mut tx, dispatch_id, dispatch.expected_delivery_date, user_id).await?;

        if let Some(next) = input.status {
            let raw = sqlx::query_scalar::<_, String>(
                "SELECT status FROM delivery_tracking WHERE dispatch_id = $1 FOR UPDATE",
            )
            .bind(dispatch_id)
            .fetch_one(&mut *tx)
            .await?;
            let current: TrackingStatus = shared::parse_status(&raw)?;

            if current != next {
                ensure_transition(current, next)?;
                set_tracking_status(&mut tx, dispatch_id, next, input.delivered_date, user_id).await?;
                move_dispatch(&mut tx, dispatch_id, dispatch_status_for(next)).await?;
            }
        }

        let sql = format!(
            r#"
            UPDATE delivery_tracking SET
                current_location = COALESCE($2, current_location),
                expected_delivery_date = COALESCE($3, expected_delivery_date),
                received_by = COALESCE($4, received_by),
                remarks = COALESCE($5, remarks),
                updated_by = $6,
                updated_at = NOW()
            WHERE dispatch_id = $1
            RETURNING {TRACKING_COLUMNS}
            "#
        );
        let tracking = sqlx::query_as::<_, DeliveryTracking>(&sql)
            .bind(dispatch_id)
            .bind(input.current_location)
            .bind(input.expected_delivery_date)
            .bind(input.received_by)
            .bind(input.remarks)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(tracking)
    }

    /// Papers with an approved quality check that have not left yet
    pub async fn ready_for_dispatch(&self) -> AppResult<Vec<ProductionPaper>> {
        let sql = format!(
            r#"
            SELECT {PAPER_COLUMNS} FROM production_papers p
            WHERE NOT p.is_deleted
              AND p.status = $1
              AND EXISTS (SELECT 1 FROM quality_checks q WHERE q.production_paper_id = p.id AND q.status = 'approved')
              AND NOT EXISTS (SELECT 1 FROM dispatches d WHERE d.production_paper_id = p.id AND d.status <> 'draft')
            ORDER BY p.updated_at
            "#
        );
        let papers = sqlx::query_as::<_, ProductionPaper>(&sql)
            .bind(PaperStatus::ReadyForDispatch.as_str())
            .fetch_all(&self.db)
            .await?;
        Ok(papers)
    }

    pub async fn dashboard(&self) -> AppResult<DispatchDashboard> {
        let by_status = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM dispatches GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.db)
        .await?
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();

        let ready_for_dispatch = self.ready_for_dispatch().await?.len() as i64;
        let (in_transit, delivered_today) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT COUNT(*) FILTER (WHERE status = 'in_transit'),
                   COUNT(*) FILTER (WHERE status = 'delivered' AND delivered_date = CURRENT_DATE)
            FROM delivery_tracking
            "#,
        )
        .fetch_one(&self.db)
        .await?;
        let unverified_gate_passes =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM gate_passes WHERE verified_at IS NULL")
                .fetch_one(&self.db)
                .await?;

        Ok(DispatchDashboard {
            by_status,
            ready_for_dispatch,
            in_transit,
            delivered_today,
            unverified_gate_passes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn item(description: &str, quantity: i64) -> DispatchItem {
        DispatchItem {
            product_description: description.to_string(),
            quantity: Decimal::from(quantity),
            unit: Some("nos".to_string()),
            packing_details: None,
        }
    }

    #[test]
    fn test_dispatch_follows_tracking() {
        assert_eq!(dispatch_status_for(TrackingStatus::InTransit), DispatchStatus::Dispatched);
        assert_eq!(dispatch_status_for(TrackingStatus::Delayed), DispatchStatus::Delayed);
        assert_eq!(dispatch_status_for(TrackingStatus::Delivered), DispatchStatus::Delivered);
    }

    #[test]
    fn test_every_tracking_move_is_a_dispatch_move() {
        // in_transit -> delayed -> in_transit -> delivered
        let path = [TrackingStatus::Delayed, TrackingStatus::InTransit, TrackingStatus::Delivered];
        let mut dispatch = DispatchStatus::Dispatched;
        for tracking in path {
            let next = dispatch_status_for(tracking);
            assert!(ensure_transition(dispatch, next).is_ok(), "{dispatch} -> {next}");
            dispatch = next;
        }
    }

    #[test]
    fn test_items_are_checked() {
        assert!(check_items(&[item("Main door", 4)]).is_ok());
        assert!(check_items(&[]).is_err());
        assert!(check_items(&[item("Main door", 0)]).is_err());
        assert!(check_items(&[item("  ", 2)]).is_err());
    }
}

//! Quality checks, rework jobs and QC certificates

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    ensure_one_of, ensure_transition, numbering, pass_rate, ChecklistItem, DefectSeverity,
    InspectionQuantities, PaperStatus, QcStatus, ReworkStatus, StatusCount, Workflow,
};
use sqlx::{types::Json, FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{check_field, AppError, AppResult};
use crate::services::numbering::{next_number, preview_number};
use crate::services::production::{move_paper, NextNumber, ProductionPaper, PAPER_COLUMNS};
use crate::services::status::lock_status;

#[derive(Clone)]
pub struct QualityService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QualityCheck {
    pub id: Uuid,
    pub qc_number: String,
    pub production_paper_id: Uuid,
    pub production_paper_number: String,
    pub party_id: Option<Uuid>,
    pub party_name: Option<String>,
    pub inspector_id: Uuid,
    pub inspection_date: DateTime<Utc>,
    pub checklist: Json<Vec<ChecklistItem>>,
    pub quantity_inspected: i32,
    pub quantity_passed: i32,
    pub quantity_failed: i32,
    pub defect_category: Option<String>,
    pub severity: Option<String>,
    pub remarks: Option<String>,
    pub status: String,
    pub rework_job_id: Option<Uuid>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateQualityCheckInput {
    pub production_paper_id: Uuid,
    #[serde(default)]
    pub checklist: Vec<ChecklistItem>,
    #[serde(default)]
    pub quantity_inspected: i32,
    #[serde(default)]
    pub quantity_passed: i32,
    #[serde(default)]
    pub quantity_failed: i32,
    pub defect_category: Option<String>,
    pub severity: Option<DefectSeverity>,
    pub remarks: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectQualityCheckInput {
    pub defect_category: Option<String>,
    pub severity: Option<DefectSeverity>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct QualityFilter {
    pub status: Option<String>,
    pub production_paper_id: Option<Uuid>,
}

const QC_COLUMNS: &str = "id, qc_number, production_paper_id, production_paper_number, party_id, \
     party_name, inspector_id, inspection_date, checklist, quantity_inspected, quantity_passed, \
     quantity_failed, defect_category, severity, remarks, status, rework_job_id, approved_by, \
     approved_at, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReworkJob {
    pub id: Uuid,
    pub rework_number: String,
    pub quality_check_id: Uuid,
    pub production_paper_id: Uuid,
    pub rework_reason: String,
    pub assigned_to: Option<Uuid>,
    pub quantity: i32,
    pub status: String,
    pub completion_notes: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReworkInput {
    pub quality_check_id: Uuid,
    pub rework_reason: String,
    pub assigned_to: Option<Uuid>,
    #[serde(default)]
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateReworkInput {
    pub status: ReworkStatus,
    pub completion_notes: Option<String>,
}

const REWORK_COLUMNS: &str = "id, rework_number, quality_check_id, production_paper_id, \
     rework_reason, assigned_to, quantity, status, completion_notes, completed_at, created_by, \
     created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct QcCertificate {
    pub id: Uuid,
    pub certificate_number: String,
    pub quality_check_id: Uuid,
    pub production_paper_number: String,
    pub party_name: Option<String>,
    pub issued_by: Uuid,
    pub issued_at: DateTime<Utc>,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateCertificateInput {
    pub quality_check_id: Uuid,
    pub remarks: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QualityStats {
    pub by_status: Vec<StatusCount>,
    pub total: i64,
    pub pass_rate: rust_decimal::Decimal,
}

async fn load_check(conn: &mut PgConnection, id: Uuid) -> AppResult<QualityCheck> {
    let sql = format!("SELECT {QC_COLUMNS} FROM quality_checks WHERE id = $1");
    sqlx::query_as::<_, QualityCheck>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Quality check".to_string()))
}

impl QualityService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn list_checks(&self, filter: QualityFilter) -> AppResult<Vec<QualityCheck>> {
        let sql = format!(
            "SELECT {QC_COLUMNS} FROM quality_checks \
             WHERE ($1::text IS NULL OR status = $1) AND ($2::uuid IS NULL OR production_paper_id = $2) \
             ORDER BY inspection_date DESC"
        );
        let checks = sqlx::query_as::<_, QualityCheck>(&sql)
            .bind(filter.status)
            .bind(filter.production_paper_id)
            .fetch_all(&self.db)
            .await?;
        Ok(checks)
    }

    pub async fn get_check(&self, id: Uuid) -> AppResult<QualityCheck> {
        let mut conn = self.db.acquire().await?;
        load_check(&mut conn, id).await
    }

    pub async fn next_check_number(&self) -> AppResult<NextNumber> {
        let next_number =
            preview_number(&self.db, "quality_checks", "qc_number", numbering::QUALITY_CHECK).await?;
        Ok(NextNumber { next_number })
    }

    pub async fn create_check(
        &self,
        inspector_id: Uuid,
        input: CreateQualityCheckInput,
    ) -> AppResult<QualityCheck> {
        let quantities = InspectionQuantities {
            inspected: input.quantity_inspected,
            passed: input.quantity_passed,
            failed: input.quantity_failed,
        };
        check_field("quantity_inspected", quantities.validate())?;

        let mut tx = self.db.begin().await?;
        let sql = format!("SELECT {PAPER_COLUMNS} FROM production_papers WHERE id = $1 AND NOT is_deleted");
        let paper = sqlx::query_as::<_, ProductionPaper>(&sql)
            .bind(input.production_paper_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Production paper".to_string()))?;

        let number = next_number(&mut tx, "quality_checks", "qc_number", numbering::QUALITY_CHECK).await?;
        let sql = format!(
            r#"
            INSERT INTO quality_checks (
                qc_number, production_paper_id, production_paper_number, party_id, party_name,
                inspector_id, inspection_date, checklist, quantity_inspected, quantity_passed,
                quantity_failed, defect_category, severity, remarks, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {QC_COLUMNS}
            "#
        );
        let check = sqlx::query_as::<_, QualityCheck>(&sql)
            .bind(&number)
            .bind(paper.id)
            .bind(&paper.paper_number)
            .bind(paper.party_id)
            .bind(&paper.party_name)
            .bind(inspector_id)
            .bind(Json(&input.checklist))
            .bind(quantities.inspected)
            .bind(quantities.passed)
            .bind(quantities.failed)
            .bind(input.defect_category)
            .bind(input.severity.map(|s| s.as_str()))
            .bind(input.remarks)
            .bind(QcStatus::Pending.as_str())
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(qc_number = %number, paper = %paper.paper_number, "Quality check recorded");
        Ok(check)
    }

    /// Approval releases the paper for dispatch in the same transaction
    pub async fn approve_check(&self, approver: Uuid, id: Uuid) -> AppResult<QualityCheck> {
        let mut tx = self.db.begin().await?;
        let current: QcStatus = lock_status(&mut tx, "quality_checks", id, "Quality check").await?;
        ensure_transition(current, QcStatus::Approved)?;

        let sql = format!(
            r#"
            UPDATE quality_checks
            SET status = $2, approved_by = $3, approved_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING {QC_COLUMNS}
            "#
        );
        let check = sqlx::query_as::<_, QualityCheck>(&sql)
            .bind(id)
            .bind(QcStatus::Approved.as_str())
            .bind(approver)
            .fetch_one(&mut *tx)
            .await?;

        let paper_status: PaperStatus = lock_status(
            &mut tx,
            "production_papers",
            check.production_paper_id,
            "Production paper",
        )
        .await?;
        if paper_status.can_transition_to(PaperStatus::ReadyForDispatch) {
            move_paper(&mut tx, check.production_paper_id, PaperStatus::ReadyForDispatch).await?;
        } else {
            tracing::info!(
                paper = %check.production_paper_number,
                status = %paper_status,
                "Paper left in place after quality approval"
            );
        }

        tx.commit().await?;
        tracing::info!(qc = %check.qc_number, "Quality check approved");
        Ok(check)
    }

    pub async fn reject_check(
        &self,
        id: Uuid,
        input: RejectQualityCheckInput,
    ) -> AppResult<QualityCheck> {
        let mut tx = self.db.begin().await?;
        let current: QcStatus = lock_status(&mut tx, "quality_checks", id, "Quality check").await?;
        ensure_transition(current, QcStatus::Rejected)?;

        let sql = format!(
            r#"
            UPDATE quality_checks SET
                status = $2,
                defect_category = COALESCE($3, defect_category),
                severity = COALESCE($4, severity),
                remarks = COALESCE($5, remarks),
                updated_at = NOW()
            WHERE id = $1
            RETURNING {QC_COLUMNS}
            "#
        );
        let check = sqlx::query_as::<_, QualityCheck>(&sql)
            .bind(id)
            .bind(QcStatus::Rejected.as_str())
            .bind(input.defect_category)
            .bind(input.severity.map(|s| s.as_str()))
            .bind(input.remarks)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::warn!(qc = %check.qc_number, paper = %check.production_paper_number, "Quality check rejected");
        Ok(check)
    }

    /// Papers in production still waiting for an approved check
    pub async fn pending_papers(&self) -> AppResult<Vec<ProductionPaper>> {
        let sql = format!(
            "SELECT {PAPER_COLUMNS} FROM production_papers p \
             WHERE p.status = $1 AND NOT p.is_deleted \
               AND NOT EXISTS (SELECT 1 FROM quality_checks q \
                               WHERE q.production_paper_id = p.id AND q.status = $2) \
             ORDER BY p.expected_dispatch_date NULLS LAST"
        );
        let papers = sqlx::query_as::<_, ProductionPaper>(&sql)
            .bind(PaperStatus::InProduction.as_str())
            .bind(QcStatus::Approved.as_str())
            .fetch_all(&self.db)
            .await?;
        Ok(papers)
    }

    /// Decided checks, newest first
    pub async fn history(&self) -> AppResult<Vec<QualityCheck>> {
        let sql = format!(
            "SELECT {QC_COLUMNS} FROM quality_checks WHERE status <> $1 ORDER BY updated_at DESC"
        );
        let checks = sqlx::query_as::<_, QualityCheck>(&sql)
            .bind(QcStatus::Pending.as_str())
            .fetch_all(&self.db)
            .await?;
        Ok(checks)
    }

    pub async fn stats(&self) -> AppResult<QualityStats> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT status, COUNT(*) FROM quality_checks GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.db)
        .await?;

        let count_of = |status: QcStatus| {
            rows.iter()
                .find(|(s, _)| s == status.as_str())
                .map(|(_, c)| *c)
                .unwrap_or(0)
        };
        let rate = pass_rate(count_of(QcStatus::Approved), count_of(QcStatus::Rejected));
        let total = rows.iter().map(|(_, c)| c).sum();

        Ok(QualityStats {
            by_status: rows
                .into_iter()
                .map(|(status, count)| StatusCount { status, count })
                .collect(),
            total,
            pass_rate: rate,
        })
    }

    // ---- Rework ----

    pub async fn list_rework(&self, status: Option<String>) -> AppResult<Vec<ReworkJob>> {
        let sql = format!(
            "SELECT {REWORK_COLUMNS} FROM rework_jobs WHERE ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC"
        );
        let jobs = sqlx::query_as::<_, ReworkJob>(&sql)
            .bind(status)
            .fetch_all(&self.db)
            .await?;
        Ok(jobs)
    }

    pub async fn create_rework(&self, user_id: Uuid, input: CreateReworkInput) -> AppResult<ReworkJob> {
        check_field("rework_reason", shared::validate_non_empty(&input.rework_reason))?;
        if input.quantity < 0 {
            return Err(AppError::validation("quantity", "Quantity cannot be negative"));
        }

        let mut tx = self.db.begin().await?;
        let current: QcStatus =
            lock_status(&mut tx, "quality_checks", input.quality_check_id, "Quality check").await?;
        ensure_transition(current, QcStatus::ReworkRequired)?;
        let check = load_check(&mut tx, input.quality_check_id).await?;

        let number = next_number(&mut tx, "rework_jobs", "rework_number", numbering::REWORK_JOB).await?;
        let sql = format!(
            r#"
            INSERT INTO rework_jobs (rework_number, quality_check_id, production_paper_id,
                                     rework_reason, assigned_to, quantity, status, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {REWORK_COLUMNS}
            "#
        );
        let job = sqlx::query_as::<_, ReworkJob>(&sql)
            .bind(&number)
            .bind(check.id)
            .bind(check.production_paper_id)
            .bind(input.rework_reason.trim())
            .bind(input.assigned_to)
            .bind(input.quantity)
            .bind(ReworkStatus::Pending.as_str())
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE quality_checks SET status = $2, rework_job_id = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(check.id)
        .bind(QcStatus::ReworkRequired.as_str())
        .bind(job.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(rework = %number, qc = %check.qc_number, "Rework job opened");
        Ok(job)
    }

    /// Completing rework sends the check back for re-inspection
    pub async fn update_rework(&self, id: Uuid, input: UpdateReworkInput) -> AppResult<ReworkJob> {
        let mut tx = self.db.begin().await?;
        let current: ReworkStatus = lock_status(&mut tx, "rework_jobs", id, "Rework job").await?;
        ensure_transition(current, input.status)?;
        let completed = input.status == ReworkStatus::Completed;

        let sql = format!(
            r#"
            UPDATE rework_jobs SET
                status = $2,
                completion_notes = COALESCE($3, completion_notes),
                completed_at = CASE WHEN $4 THEN NOW() ELSE completed_at END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {REWORK_COLUMNS}
            "#
        );
        let job = sqlx::query_as::<_, ReworkJob>(&sql)
            .bind(id)
            .bind(input.status.as_str())
            .bind(input.completion_notes)
            .bind(completed)
            .fetch_one(&mut *tx)
            .await?;

        if completed {
            let qc_status: QcStatus =
                lock_status(&mut tx, "quality_checks", job.quality_check_id, "Quality check").await?;
            if qc_status == QcStatus::ReworkRequired {
                ensure_transition(qc_status, QcStatus::Pending)?;
                sqlx::query("UPDATE quality_checks SET status = $2, updated_at = NOW() WHERE id = $1")
                    .bind(job.quality_check_id)
                    .bind(QcStatus::Pending.as_str())
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;
        Ok(job)
    }

    // ---- Certificates ----

    pub async fn list_certificates(&self) -> AppResult<Vec<QcCertificate>> {
        let certificates = sqlx::query_as::<_, QcCertificate>(
            "SELECT id, certificate_number, quality_check_id, production_paper_number, party_name, \
                    issued_by, issued_at, remarks \
             FROM qc_certificates ORDER BY issued_at DESC",
        )
        .fetch_all(&self.db)
        .await?;
        Ok(certificates)
    }

    pub async fn issue_certificate(
        &self,
        user_id: Uuid,
        input: CreateCertificateInput,
    ) -> AppResult<QcCertificate> {
        let mut tx = self.db.begin().await?;
        let check = load_check(&mut tx, input.quality_check_id).await?;
        let status: QcStatus = shared::parse_status(&check.status)?;
        ensure_one_of(status, &[QcStatus::Approved])?;

        let number =
            next_number(&mut tx, "qc_certificates", "certificate_number", numbering::QC_CERTIFICATE).await?;
        let certificate = sqlx::query_as::<_, QcCertificate>(
            r#"
            INSERT INTO qc_certificates (certificate_number, quality_check_id, production_paper_number,
                                         party_name, issued_by, remarks)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, certificate_number, quality_check_id, production_paper_number, party_name,
                      issued_by, issued_at, remarks
            "#,
        )
        .bind(&number)
        .bind(check.id)
        .bind(&check.production_paper_number)
        .bind(&check.party_name)
        .bind(user_id)
        .bind(input.remarks)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        tracing::info!(certificate = %number, qc = %check.qc_number, "QC certificate issued");
        Ok(certificate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_certificate_requires_approved_check() {
        assert!(ensure_one_of(QcStatus::Approved, &[QcStatus::Approved]).is_ok());
        for status in [QcStatus::Pending, QcStatus::Rejected, QcStatus::ReworkRequired] {
            let err: AppError = ensure_one_of(status, &[QcStatus::Approved]).unwrap_err().into();
            assert!(matches!(err, AppError::InvalidStateTransition(_)));
        }
    }

    #[test]
    fn test_reject_input_is_optional() {
        let input: RejectQualityCheckInput = serde_json::from_str("{}").unwrap();
        assert!(input.defect_category.is_none());
        let input: RejectQualityCheckInput =
            serde_json::from_str(r#"{"severity":"major","remarks":"Veneer lifting"}"#).unwrap();
        assert_eq!(input.severity, Some(DefectSeverity::Major));
    }
}

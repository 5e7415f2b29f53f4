//! Accounts receivable
//!
//! Payment receipts, allocation of receipts against tax invoices, the
//! per-invoice receivable ledger with aging, and party reconciliations.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use shared::{
    age_receivable, credit_period_days, ensure_transition, numbering, reconciliation_closing,
    AgingBucket, AgingTotals, InvoiceStatus, PaymentMode, ReceiptBalance, ReceiptStatus,
    ReceivableStatus, ReconciliationStatus,
};
use sqlx::{FromRow, PgConnection, PgPool};
use uuid::Uuid;

use crate::error::{check_field, AppError, AppResult};
use crate::services::numbering::next_number;
use crate::services::sales::party_name;
use crate::services::status::lock_status;

#[derive(Clone)]
pub struct AccountsService {
    db: PgPool,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PaymentReceipt {
    pub id: Uuid,
    pub receipt_number: String,
    pub party_id: Uuid,
    pub party_name: String,
    pub receipt_date: NaiveDate,
    pub payment_mode: String,
    pub reference_number: Option<String>,
    pub bank_name: Option<String>,
    pub payment_amount: Decimal,
    pub allocated_amount: Decimal,
    pub unallocated_amount: Decimal,
    pub status: String,
    pub cleared_date: Option<NaiveDate>,
    pub remarks: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReceiptInput {
    pub party_id: Uuid,
    pub receipt_date: Option<NaiveDate>,
    pub payment_mode: PaymentMode,
    pub reference_number: Option<String>,
    pub bank_name: Option<String>,
    pub payment_amount: Decimal,
    pub remarks: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptStatusInput {
    pub status: ReceiptStatus,
    pub cleared_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ReceiptFilter {
    pub party_id: Option<Uuid>,
    pub status: Option<String>,
}

const RECEIPT_COLUMNS: &str = "id, receipt_number, party_id, party_name, receipt_date, \
     payment_mode, reference_number, bank_name, payment_amount, allocated_amount, \
     unallocated_amount, status, cleared_date, remarks, created_by, created_at, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct PaymentAllocation {
    pub id: Uuid,
    pub receipt_id: Uuid,
    pub invoice_id: Uuid,
    pub allocated_amount: Decimal,
    pub allocated_by: Uuid,
    pub allocated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct AllocateInput {
    pub receipt_id: Uuid,
    pub invoice_id: Uuid,
    pub amount: Decimal,
}

#[derive(Debug, Serialize)]
pub struct AllocationResult {
    pub allocation: PaymentAllocation,
    pub receipt: PaymentReceipt,
    pub receivable: Receivable,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Receivable {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub party_id: Uuid,
    pub party_name: String,
    pub invoice_number: String,
    pub invoice_date: NaiveDate,
    pub due_date: NaiveDate,
    pub invoice_amount: Decimal,
    pub paid_amount: Decimal,
    pub outstanding_amount: Decimal,
    pub days_overdue: i32,
    pub aging_bucket: String,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct ReceivableFilter {
    pub party_id: Option<Uuid>,
    pub status: Option<String>,
    pub aging_bucket: Option<String>,
}

const RECEIVABLE_COLUMNS: &str = "id, invoice_id, party_id, party_name, invoice_number, \
     invoice_date, due_date, invoice_amount, paid_amount, outstanding_amount, days_overdue, \
     aging_bucket, status, updated_at";

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Reconciliation {
    pub id: Uuid,
    pub reconciliation_number: String,
    pub party_id: Uuid,
    pub party_name: String,
    pub period_from: NaiveDate,
    pub period_to: NaiveDate,
    pub opening_balance: Decimal,
    pub total_invoices: Decimal,
    pub total_payments: Decimal,
    pub closing_balance: Decimal,
    pub status: String,
    pub remarks: Option<String>,
    pub approved_by: Option<Uuid>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReconciliationInput {
    pub party_id: Uuid,
    pub period_from: NaiveDate,
    pub period_to: NaiveDate,
    #[serde(default)]
    pub opening_balance: Decimal,
    pub remarks: Option<String>,
}

const RECONCILIATION_COLUMNS: &str = "id, reconciliation_number, party_id, party_name, \
     period_from, period_to, opening_balance, total_invoices, total_payments, closing_balance, \
     status, remarks, approved_by, approved_at, created_by, created_at";

#[derive(Debug, Serialize)]
pub struct AccountsDashboard {
    pub total_receivables: Decimal,
    pub overdue_amount: Decimal,
    pub aging: AgingTotals,
    pub receipts_this_month: Decimal,
    pub unallocated_cash: Decimal,
    pub pending_cheques: i64,
}

/// Outstanding receivables of one party, by bucket
#[derive(Debug, Clone, Serialize)]
pub struct PartyAging {
    pub party_id: Uuid,
    pub party_name: String,
    #[serde(flatten)]
    pub buckets: AgingTotals,
    pub total: Decimal,
}

/// Row of the aging CSV export
#[derive(Debug, Serialize)]
struct AgingCsvRow<'a> {
    party_name: &'a str,
    current: Decimal,
    #[serde(rename = "0-30")]
    days_0_30: Decimal,
    #[serde(rename = "31-60")]
    days_31_60: Decimal,
    #[serde(rename = "61-90")]
    days_61_90: Decimal,
    #[serde(rename = "90+")]
    over_90: Decimal,
    total: Decimal,
}

#[derive(FromRow)]
struct InvoiceLedgerRow {
    party_id: Uuid,
    party_name: String,
    invoice_number: String,
    invoice_date: NaiveDate,
    grand_total: Decimal,
    payment_terms: Option<String>,
    credit_days: Option<i32>,
    paid: Decimal,
}

/// Group open receivables by party, keeping the order of first appearance
fn group_aging(rows: Vec<(Uuid, String, i32, Decimal)>) -> Vec<PartyAging> {
    let mut parties: Vec<PartyAging> = Vec::new();
    for (party_id, party_name, days_overdue, outstanding) in rows {
        let bucket = AgingBucket::classify(i64::from(days_overdue));
        let index = match parties.iter().position(|p| p.party_id == party_id) {
            Some(index) => index,
            None => {
                parties.push(PartyAging {
                    party_id,
                    party_name,
                    buckets: AgingTotals::default(),
                    total: Decimal::ZERO,
                });
                parties.len() - 1
            }
        };
        let party = &mut parties[index];
        party.buckets.add(bucket, outstanding);
        party.total = party.buckets.total();
    }
    parties
}

/// Recompute the receivable of one invoice as of `today` and store it
async fn upsert_receivable(
    conn: &mut PgConnection,
    invoice_id: Uuid,
    today: NaiveDate,
) -> AppResult<Receivable> {
    let ledger = sqlx::query_as::<_, InvoiceLedgerRow>(
        r#"
        SELECT i.party_id, i.party_name, i.invoice_number, i.invoice_date, i.grand_total,
               p.payment_terms, p.credit_days,
               COALESCE((SELECT SUM(a.allocated_amount) FROM payment_allocations a WHERE a.invoice_id = i.id), 0) AS paid
        FROM tax_invoices i
        JOIN parties p ON p.id = i.party_id
        WHERE i.id = $1
        "#,
    )
    .bind(invoice_id)
    .fetch_optional(&mut *conn)
    .await?
    .ok_or_else(|| AppError::NotFound("Tax invoice".to_string()))?;

    let period = credit_period_days(ledger.payment_terms.as_deref(), ledger.credit_days);
    let aging = age_receivable(ledger.invoice_date, period, ledger.grand_total, ledger.paid, today);
    let days_overdue = i32::try_from(aging.days_overdue).unwrap_or(i32::MAX);

    let sql = format!(
        r#"
        INSERT INTO receivables (invoice_id, party_id, party_name, invoice_number, invoice_date,
                                 due_date, invoice_amount, paid_amount, outstanding_amount,
                                 days_overdue, aging_bucket, status)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        ON CONFLICT (invoice_id) DO UPDATE SET
            due_date = EXCLUDED.due_date,
            invoice_amount = EXCLUDED.invoice_amount,
            paid_amount = EXCLUDED.paid_amount,
            outstanding_amount = EXCLUDED.outstanding_amount,
            days_overdue = EXCLUDED.days_overdue,
            aging_bucket = EXCLUDED.aging_bucket,
            status = EXCLUDED.status,
            updated_at = NOW()
        RETURNING {RECEIVABLE_COLUMNS}
        "#
    );
    let receivable = sqlx::query_as::<_, Receivable>(&sql)
        .bind(invoice_id)
        .bind(ledger.party_id)
        .bind(&ledger.party_name)
        .bind(&ledger.invoice_number)
        .bind(ledger.invoice_date)
        .bind(aging.due_date)
        .bind(ledger.grand_total)
        .bind(ledger.paid)
        .bind(aging.outstanding)
        .bind(days_overdue)
        .bind(aging.bucket.as_str())
        .bind(aging.status.as_str())
        .fetch_one(&mut *conn)
        .await?;
    Ok(receivable)
}

async fn load_receipt(conn: &mut PgConnection, id: Uuid) -> AppResult<PaymentReceipt> {
    let sql = format!("SELECT {RECEIPT_COLUMNS} FROM payment_receipts WHERE id = $1");
    sqlx::query_as::<_, PaymentReceipt>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| AppError::NotFound("Payment receipt".to_string()))
}

impl AccountsService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    // ---- Receipts ----

    pub async fn list_receipts(&self, filter: ReceiptFilter) -> AppResult<Vec<PaymentReceipt>> {
        let sql = format!(
            "SELECT {RECEIPT_COLUMNS} FROM payment_receipts \
             WHERE ($1::uuid IS NULL OR party_id = $1) AND ($2::text IS NULL OR status = $2) \
             ORDER BY receipt_date DESC, receipt_number DESC"
        );
        let receipts = sqlx::query_as::<_, PaymentReceipt>(&sql)
            .bind(filter.party_id)
            .bind(filter.status)
            .fetch_all(&self.db)
            .await?;
        Ok(receipts)
    }

    pub async fn get_receipt(&self, id: Uuid) -> AppResult<PaymentReceipt> {
        let mut conn = self.db.acquire().await?;
        load_receipt(&mut conn, id).await
    }

    pub async fn create_receipt(&self, user_id: Uuid, input: CreateReceiptInput) -> AppResult<PaymentReceipt> {
        check_field("payment_amount", shared::validate_positive(input.payment_amount))?;

        let mut tx = self.db.begin().await?;
        let party = party_name(&mut tx, input.party_id).await?;
        let status = ReceiptStatus::initial_for(input.payment_mode);
        let balance = ReceiptBalance::new(input.payment_amount);

        let number = next_number(&mut tx, "payment_receipts", "receipt_number", numbering::PAYMENT_RECEIPT).await?;
        let sql = format!(
            r#"
            INSERT INTO payment_receipts (receipt_number, party_id, party_name, receipt_date, payment_mode,
                                          reference_number, bank_name, payment_amount, allocated_amount,
                                          unallocated_amount, status, remarks, created_by)
            VALUES ($1, $2, $3, COALESCE($4, CURRENT_DATE), $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {RECEIPT_COLUMNS}
            "#
        );
        let receipt = sqlx::query_as::<_, PaymentReceipt>(&sql)
            .bind(&number)
            .bind(input.party_id)
            .bind(&party)
            .bind(input.receipt_date)
            .bind(input.payment_mode.as_str())
            .bind(input.reference_number)
            .bind(input.bank_name)
            .bind(balance.payment_amount)
            .bind(balance.allocated_amount)
            .bind(balance.unallocated_amount)
            .bind(status.as_str())
            .bind(input.remarks)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(receipt = %number, party = %party, amount = %input.payment_amount, %status, "Payment received");
        Ok(receipt)
    }

    /// Move a receipt along its workflow.
    ///
    /// A bounced receipt gives back everything it had allocated and the
    /// affected receivables are recomputed.
    pub async fn update_receipt_status(&self, id: Uuid, input: ReceiptStatusInput) -> AppResult<PaymentReceipt> {
        let mut tx = self.db.begin().await?;
        let current: ReceiptStatus = lock_status(&mut tx, "payment_receipts", id, "Payment receipt").await?;
        ensure_transition(current, input.status)?;

        let mut reversed = Vec::new();
        if input.status == ReceiptStatus::Bounced {
            reversed = sqlx::query_scalar::<_, Uuid>(
                "DELETE FROM payment_allocations WHERE receipt_id = $1 RETURNING invoice_id",
            )
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;
        }

        let sql = format!(
            r#"
            UPDATE payment_receipts SET
                status = $2,
                cleared_date = CASE WHEN $2 = 'cleared' THEN COALESCE($3, CURRENT_DATE) ELSE cleared_date END,
                allocated_amount = CASE WHEN $2 = 'bounced' THEN 0 ELSE allocated_amount END,
                unallocated_amount = CASE WHEN $2 = 'bounced' THEN payment_amount ELSE unallocated_amount END,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {RECEIPT_COLUMNS}
            "#
        );
        let receipt = sqlx::query_as::<_, PaymentReceipt>(&sql)
            .bind(id)
            .bind(input.status.as_str())
            .bind(input.cleared_date)
            .fetch_one(&mut *tx)
            .await?;

        let today = Utc::now().date_naive();
        reversed.sort_unstable();
        reversed.dedup();
        for invoice_id in &reversed {
            upsert_receivable(&mut tx, *invoice_id, today).await?;
        }

        tx.commit().await?;
        tracing::info!(
            receipt = %receipt.receipt_number,
            from = %current,
            to = %input.status,
            reversed_invoices = reversed.len(),
            "Receipt status changed"
        );
        Ok(receipt)
    }

    pub async fn list_allocations(&self, receipt_id: Uuid) -> AppResult<Vec<PaymentAllocation>> {
        let allocations = sqlx::query_as::<_, PaymentAllocation>(
            "SELECT id, receipt_id, invoice_id, allocated_amount, allocated_by, allocated_at \
             FROM payment_allocations WHERE receipt_id = $1 ORDER BY allocated_at",
        )
        .bind(receipt_id)
        .fetch_all(&self.db)
        .await?;
        Ok(allocations)
    }

    /// Apply part of a receipt to an invoice of the same party
    pub async fn allocate(&self, user_id: Uuid, input: AllocateInput) -> AppResult<AllocationResult> {
        let mut tx = self.db.begin().await?;

        let receipt_sql = format!("SELECT {RECEIPT_COLUMNS} FROM payment_receipts WHERE id = $1 FOR UPDATE");
        let receipt = sqlx::query_as::<_, PaymentReceipt>(&receipt_sql)
            .bind(input.receipt_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| AppError::NotFound("Payment receipt".to_string()))?;
        let (invoice_party, grand_total, invoice_number) = sqlx::query_as::<_, (Uuid, Decimal, String)>(
            "SELECT party_id, grand_total, invoice_number FROM tax_invoices WHERE id = $1 FOR UPDATE",
        )
        .bind(input.invoice_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::NotFound("Tax invoice".to_string()))?;

        if receipt.party_id != invoice_party {
            return Err(AppError::BusinessRule(
                "Receipt and invoice belong to different parties".to_string(),
            ));
        }
        let status: ReceiptStatus = shared::parse_status(&receipt.status)?;
        if status == ReceiptStatus::Bounced {
            return Err(AppError::BusinessRule(format!(
                "Receipt {} has bounced",
                receipt.receipt_number
            )));
        }

        let already_paid = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(allocated_amount), 0) FROM payment_allocations WHERE invoice_id = $1",
        )
        .bind(input.invoice_id)
        .fetch_one(&mut *tx)
        .await?;
        let balance = ReceiptBalance {
            payment_amount: receipt.payment_amount,
            allocated_amount: receipt.allocated_amount,
            unallocated_amount: receipt.unallocated_amount,
        }
        .allocate(input.amount, grand_total - already_paid)?;

        let allocation = sqlx::query_as::<_, PaymentAllocation>(
            r#"
            INSERT INTO payment_allocations (receipt_id, invoice_id, allocated_amount, allocated_by)
            VALUES ($1, $2, $3, $4)
            RETURNING id, receipt_id, invoice_id, allocated_amount, allocated_by, allocated_at
            "#,
        )
        .bind(receipt.id)
        .bind(input.invoice_id)
        .bind(input.amount)
        .bind(user_id)
        .fetch_one(&mut *tx)
        .await?;

        let sql = format!(
            r#"
            UPDATE payment_receipts SET allocated_amount = $2, unallocated_amount = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING {RECEIPT_COLUMNS}
            "#
        );
        let receipt = sqlx::query_as::<_, PaymentReceipt>(&sql)
            .bind(receipt.id)
            .bind(balance.allocated_amount)
            .bind(balance.unallocated_amount)
            .fetch_one(&mut *tx)
            .await?;

        let receivable = upsert_receivable(&mut tx, input.invoice_id, Utc::now().date_naive()).await?;
        tx.commit().await?;

        tracing::info!(
            receipt = %receipt.receipt_number,
            invoice = %invoice_number,
            amount = %input.amount,
            unallocated = %balance.unallocated_amount,
            "Payment allocated"
        );
        Ok(AllocationResult {
            allocation,
            receipt,
            receivable,
        })
    }

    // ---- Receivables ----

    pub async fn list_receivables(&self, filter: ReceivableFilter) -> AppResult<Vec<Receivable>> {
        let sql = format!(
            "SELECT {RECEIVABLE_COLUMNS} FROM receivables \
             WHERE ($1::uuid IS NULL OR party_id = $1) AND ($2::text IS NULL OR status = $2) \
               AND ($3::text IS NULL OR aging_bucket = $3) \
             ORDER BY days_overdue DESC, invoice_date"
        );
        let receivables = sqlx::query_as::<_, Receivable>(&sql)
            .bind(filter.party_id)
            .bind(filter.status)
            .bind(filter.aging_bucket)
            .fetch_all(&self.db)
            .await?;
        Ok(receivables)
    }

    /// Recompute every open receivable as of today, creating rows for
    /// approved invoices that have none yet. Returns the number refreshed.
    pub async fn refresh_receivables(&self) -> AppResult<usize> {
        let statuses: Vec<&str> = InvoiceStatus::OUTSTANDING.iter().map(|s| s.as_str()).collect();
        let mut tx = self.db.begin().await?;
        let invoice_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT i.id FROM tax_invoices i
            LEFT JOIN receivables r ON r.invoice_id = i.id
            WHERE i.status = ANY($1) AND (r.id IS NULL OR r.status <> $2)
            "#,
        )
        .bind(statuses)
        .bind(ReceivableStatus::Paid.as_str())
        .fetch_all(&mut *tx)
        .await?;

        let today = Utc::now().date_naive();
        for invoice_id in &invoice_ids {
            upsert_receivable(&mut tx, *invoice_id, today).await?;
        }
        tx.commit().await?;

        tracing::info!(count = invoice_ids.len(), %today, "Receivables refreshed");
        Ok(invoice_ids.len())
    }

    // ---- Reconciliation ----

    pub async fn list_reconciliations(&self, party_id: Option<Uuid>) -> AppResult<Vec<Reconciliation>> {
        let sql = format!(
            "SELECT {RECONCILIATION_COLUMNS} FROM reconciliations \
             WHERE ($1::uuid IS NULL OR party_id = $1) ORDER BY created_at DESC"
        );
        let reconciliations = sqlx::query_as::<_, Reconciliation>(&sql)
            .bind(party_id)
            .fetch_all(&self.db)
            .await?;
        Ok(reconciliations)
    }

    pub async fn get_reconciliation(&self, id: Uuid) -> AppResult<Reconciliation> {
        let sql = format!("SELECT {RECONCILIATION_COLUMNS} FROM reconciliations WHERE id = $1");
        sqlx::query_as::<_, Reconciliation>(&sql)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Reconciliation".to_string()))
    }

    pub async fn create_reconciliation(
        &self,
        user_id: Uuid,
        input: CreateReconciliationInput,
    ) -> AppResult<Reconciliation> {
        if input.period_to < input.period_from {
            return Err(AppError::validation("period_to", "Period end is before period start"));
        }

        let mut tx = self.db.begin().await?;
        let party = party_name(&mut tx, input.party_id).await?;

        let invoice_statuses: Vec<&str> = InvoiceStatus::OUTSTANDING.iter().map(|s| s.as_str()).collect();
        let total_invoices = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(grand_total), 0) FROM tax_invoices \
             WHERE party_id = $1 AND status = ANY($2) AND invoice_date BETWEEN $3 AND $4",
        )
        .bind(input.party_id)
        .bind(invoice_statuses)
        .bind(input.period_from)
        .bind(input.period_to)
        .fetch_one(&mut *tx)
        .await?;

        let receipt_statuses: Vec<&str> = ReceiptStatus::COLLECTED.iter().map(|s| s.as_str()).collect();
        let total_payments = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(payment_amount), 0) FROM payment_receipts \
             WHERE party_id = $1 AND status = ANY($2) AND receipt_date BETWEEN $3 AND $4",
        )
        .bind(input.party_id)
        .bind(receipt_statuses)
        .bind(input.period_from)
        .bind(input.period_to)
        .fetch_one(&mut *tx)
        .await?;

        let closing = reconciliation_closing(input.opening_balance, total_invoices, total_payments);
        let number = next_number(&mut tx, "reconciliations", "reconciliation_number", numbering::RECONCILIATION).await?;
        let sql = format!(
            r#"
            INSERT INTO reconciliations (reconciliation_number, party_id, party_name, period_from, period_to,
                                         opening_balance, total_invoices, total_payments, closing_balance,
                                         status, remarks, created_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING {RECONCILIATION_COLUMNS}
            "#
        );
        let reconciliation = sqlx::query_as::<_, Reconciliation>(&sql)
            .bind(&number)
            .bind(input.party_id)
            .bind(&party)
            .bind(input.period_from)
            .bind(input.period_to)
            .bind(input.opening_balance)
            .bind(total_invoices)
            .bind(total_payments)
            .bind(closing)
            .bind(ReconciliationStatus::Draft.as_str())
            .bind(input.remarks)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(reconciliation = %number, party = %party, closing = %closing, "Reconciliation prepared");
        Ok(reconciliation)
    }

    pub async fn approve_reconciliation(&self, approver: Uuid, id: Uuid) -> AppResult<Reconciliation> {
        let mut tx = self.db.begin().await?;
        let current: ReconciliationStatus = lock_status(&mut tx, "reconciliations", id, "Reconciliation").await?;
        ensure_transition(current, ReconciliationStatus::Approved)?;

        let sql = format!(
            "UPDATE reconciliations SET status = $2, approved_by = $3, approved_at = NOW() \
             WHERE id = $1 RETURNING {RECONCILIATION_COLUMNS}"
        );
        let reconciliation = sqlx::query_as::<_, Reconciliation>(&sql)
            .bind(id)
            .bind(ReconciliationStatus::Approved.as_str())
            .bind(approver)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(reconciliation)
    }

    // ---- Reports ----

    async fn open_receivables(&self) -> AppResult<Vec<(Uuid, String, i32, Decimal)>> {
        let rows = sqlx::query_as::<_, (Uuid, String, i32, Decimal)>(
            "SELECT party_id, party_name, days_overdue, outstanding_amount FROM receivables \
             WHERE status <> $1 ORDER BY party_name, invoice_date",
        )
        .bind(ReceivableStatus::Paid.as_str())
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    pub async fn aging_by_party(&self) -> AppResult<Vec<PartyAging>> {
        Ok(group_aging(self.open_receivables().await?))
    }

    /// Party aging rendered as CSV
    pub async fn aging_csv(&self) -> AppResult<String> {
        let parties = self.aging_by_party().await?;
        let mut wtr = csv::Writer::from_writer(vec![]);
        for party in &parties {
            wtr.serialize(AgingCsvRow {
                party_name: &party.party_name,
                current: party.buckets.current,
                days_0_30: party.buckets.days_0_30,
                days_31_60: party.buckets.days_31_60,
                days_61_90: party.buckets.days_61_90,
                over_90: party.buckets.over_90,
                total: party.total,
            })
            .map_err(|e| AppError::Internal(format!("CSV serialization error: {}", e)))?;
        }
        let bytes = wtr
            .into_inner()
            .map_err(|e| AppError::Internal(format!("CSV writer error: {}", e)))?;
        String::from_utf8(bytes).map_err(|e| AppError::Internal(format!("UTF-8 conversion error: {}", e)))
    }

    pub async fn dashboard(&self) -> AppResult<AccountsDashboard> {
        let mut aging = AgingTotals::default();
        for (_, _, days_overdue, outstanding) in self.open_receivables().await? {
            aging.add(AgingBucket::classify(i64::from(days_overdue)), outstanding);
        }

        let today = Utc::now().date_naive();
        let month_start = today.with_day(1).unwrap_or(today);
        let collected: Vec<&str> = ReceiptStatus::COLLECTED.iter().map(|s| s.as_str()).collect();
        let receipts_this_month = sqlx::query_scalar::<_, Decimal>(
            "SELECT COALESCE(SUM(payment_amount), 0) FROM payment_receipts \
             WHERE status = ANY($1) AND receipt_date >= $2",
        )
        .bind(collected)
        .bind(month_start)
        .fetch_one(&self.db)
        .await?;

        let (unallocated_cash, pending_cheques) = sqlx::query_as::<_, (Decimal, i64)>(
            "SELECT COALESCE(SUM(unallocated_amount) FILTER (WHERE status <> 'bounced'), 0), \
                    COUNT(*) FILTER (WHERE status = 'pending') \
             FROM payment_receipts",
        )
        .fetch_one(&self.db)
        .await?;

        Ok(AccountsDashboard {
            total_receivables: aging.total(),
            overdue_amount: aging.overdue(),
            aging,
            receipts_this_month,
            unallocated_cash,
            pending_cheques,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(party: Uuid, name: &str, days: i32, amount: i64) -> (Uuid, String, i32, Decimal) {
        (party, name.to_string(), days, Decimal::from(amount))
    }

    #[test]
    fn test_group_aging_by_party() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let parties = group_aging(vec![
            row(a, "Arihant Builders", 0, 1000),
            row(b, "Skyline Homes", 45, 500),
            row(a, "Arihant Builders", 95, 250),
            row(a, "Arihant Builders", 12, 100),
        ]);

        assert_eq!(parties.len(), 2);
        assert_eq!(parties[0].party_name, "Arihant Builders");
        assert_eq!(parties[0].buckets.current, Decimal::from(1000));
        assert_eq!(parties[0].buckets.days_0_30, Decimal::from(100));
        assert_eq!(parties[0].buckets.over_90, Decimal::from(250));
        assert_eq!(parties[0].total, Decimal::from(1350));
        assert_eq!(parties[1].buckets.days_31_60, Decimal::from(500));
    }

    #[test]
    fn test_party_aging_serializes_flat() {
        let aging = group_aging(vec![row(Uuid::new_v4(), "Skyline Homes", 70, 900)]);
        let json = serde_json::to_value(&aging[0]).unwrap();
        assert!(json.get("days_61_90").is_some());
        assert!(json.get("buckets").is_none());
    }

    #[test]
    fn test_cheque_receipts_start_pending() {
        assert_eq!(ReceiptStatus::initial_for(PaymentMode::Cheque), ReceiptStatus::Pending);
        assert_eq!(ReceiptStatus::initial_for(PaymentMode::Upi), ReceiptStatus::Received);
    }
}

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{MySql, MySqlPool, Transaction};
use std::collections::HashMap;

use super::ledger_store::{format_sequence, LedgerOp, LedgerStore, SequenceGenerator};
use crate::core::{AppError, Result};
use crate::modules::ledger::models::{
    EmiPayment, GatewayProvider, Payment, PaymentMethod, Student, StudentLedger,
};

const STUDENT_COLUMNS: &str = r#"
    id, name, email, total_fees, paid_amount, remaining_amount,
    fee_status, status, next_payment_due, created_at, updated_at
"#;

const PAYMENT_COLUMNS: &str = r#"
    id, student_id, course_name, total_amount, deposit_amount, remaining_amount,
    installment_count, status, payment_method, currency, due_date, paid_date,
    invoice_number, receipt_number, gateway_provider, gateway_payment_id,
    transaction_id, gateway_response, notes, created_at, updated_at
"#;

const EMI_COLUMNS: &str = r#"
    id, payment_id, student_id, installment_number, amount, due_date, paid_date,
    status, payment_method, transaction_id, receipt_number, gateway_payment_id,
    gateway_response, notes, created_at, updated_at
"#;

/// MySQL-backed ledger store.
///
/// Every `transact` runs in one database transaction that starts with
/// `SELECT ... FOR UPDATE` on the student row, so concurrent writes for the
/// same student queue behind each other.
#[derive(Clone)]
pub struct MySqlLedgerStore {
    pool: MySqlPool,
}

impl MySqlLedgerStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn load_in_tx(
        tx: &mut Transaction<'_, MySql>,
        student_id: &str,
    ) -> Result<StudentLedger> {
        let student_row = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {} FROM students WHERE id = ? FOR UPDATE",
            STUDENT_COLUMNS
        ))
        .bind(student_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to lock student: {}", e)))?
        .ok_or_else(|| AppError::not_found("Student", format!("studentId={}", student_id)))?;

        let payment_rows = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE student_id = ? ORDER BY created_at ASC FOR UPDATE",
            PAYMENT_COLUMNS
        ))
        .bind(student_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch payments: {}", e)))?;

        let emi_rows = sqlx::query_as::<_, EmiPaymentRow>(&format!(
            "SELECT {} FROM emi_payments WHERE student_id = ? \
             ORDER BY payment_id ASC, installment_number ASC FOR UPDATE",
            EMI_COLUMNS
        ))
        .bind(student_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch installments: {}", e)))?;

        Ok(StudentLedger::new(
            student_row.try_into()?,
            payment_rows
                .into_iter()
                .map(Payment::try_from)
                .collect::<Result<Vec<_>>>()?,
            emi_rows
                .into_iter()
                .map(EmiPayment::try_from)
                .collect::<Result<Vec<_>>>()?,
        ))
    }

    /// Write back only what changed between `before` and `after`
    async fn persist_in_tx(
        tx: &mut Transaction<'_, MySql>,
        before: &StudentLedger,
        after: &StudentLedger,
    ) -> Result<()> {
        let old_payments: HashMap<&str, &Payment> =
            before.payments.iter().map(|p| (p.id.as_str(), p)).collect();
        let old_emis: HashMap<&str, &EmiPayment> =
            before.emi_payments.iter().map(|e| (e.id.as_str(), e)).collect();

        for emi in &before.emi_payments {
            if after.emi(&emi.id).is_none() {
                sqlx::query("DELETE FROM emi_payments WHERE id = ?")
                    .bind(&emi.id)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| AppError::Internal(format!("Failed to delete installment: {}", e)))?;
            }
        }

        for payment in &before.payments {
            if after.payment(&payment.id).is_none() {
                sqlx::query("DELETE FROM payments WHERE id = ?")
                    .bind(&payment.id)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| AppError::Internal(format!("Failed to delete payment: {}", e)))?;
            }
        }

        for payment in &after.payments {
            match old_payments.get(payment.id.as_str()) {
                None => insert_payment(tx, payment).await?,
                Some(old) if *old != payment => update_payment(tx, payment).await?,
                Some(_) => {}
            }
        }

        for emi in &after.emi_payments {
            match old_emis.get(emi.id.as_str()) {
                None => insert_emi(tx, emi).await?,
                Some(old) if *old != emi => update_emi(tx, emi).await?,
                Some(_) => {}
            }
        }

        if before.student != after.student {
            update_student(tx, &after.student).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MySqlLedgerStore {
    async fn find_student(&self, student_id: &str) -> Result<Option<Student>> {
        let row = sqlx::query_as::<_, StudentRow>(&format!(
            "SELECT {} FROM students WHERE id = ?",
            STUDENT_COLUMNS
        ))
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch student: {}", e)))?;

        row.map(Student::try_from).transpose()
    }

    async fn find_payment(&self, payment_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE id = ?",
            PAYMENT_COLUMNS
        ))
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch payment: {}", e)))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_payment_by_gateway_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments WHERE gateway_payment_id = ? \
             ORDER BY created_at DESC LIMIT 1",
            PAYMENT_COLUMNS
        ))
        .bind(gateway_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch payment: {}", e)))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_latest_open_payment(&self, student_id: &str) -> Result<Option<Payment>> {
        let row = sqlx::query_as::<_, PaymentRow>(&format!(
            "SELECT {} FROM payments \
             WHERE student_id = ? AND status IN ('pending', 'partial', 'processing') \
             ORDER BY created_at DESC LIMIT 1",
            PAYMENT_COLUMNS
        ))
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch payment: {}", e)))?;

        row.map(Payment::try_from).transpose()
    }

    async fn find_emi_payment(&self, emi_payment_id: &str) -> Result<Option<EmiPayment>> {
        let row = sqlx::query_as::<_, EmiPaymentRow>(&format!(
            "SELECT {} FROM emi_payments WHERE id = ?",
            EMI_COLUMNS
        ))
        .bind(emi_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch installment: {}", e)))?;

        row.map(EmiPayment::try_from).transpose()
    }

    async fn find_emi_by_gateway_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<EmiPayment>> {
        let row = sqlx::query_as::<_, EmiPaymentRow>(&format!(
            "SELECT {} FROM emi_payments WHERE gateway_payment_id = ? \
             ORDER BY updated_at DESC LIMIT 1",
            EMI_COLUMNS
        ))
        .bind(gateway_payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch installment: {}", e)))?;

        row.map(EmiPayment::try_from).transpose()
    }

    async fn find_earliest_open_emi(&self, student_id: &str) -> Result<Option<EmiPayment>> {
        let row = sqlx::query_as::<_, EmiPaymentRow>(&format!(
            "SELECT {} FROM emi_payments \
             WHERE student_id = ? AND status IN ('pending', 'overdue') \
             ORDER BY due_date ASC, installment_number ASC LIMIT 1",
            EMI_COLUMNS
        ))
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to fetch installment: {}", e)))?;

        row.map(EmiPayment::try_from).transpose()
    }

    async fn list_student_ids(&self) -> Result<Vec<String>> {
        let ids = sqlx::query_scalar::<_, String>("SELECT id FROM students ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to list students: {}", e)))?;
        Ok(ids)
    }

    async fn load_ledger(&self, student_id: &str) -> Result<StudentLedger> {
        let mut tx = self.pool.begin().await
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;
        let ledger = Self::load_in_tx(&mut tx, student_id).await?;
        tx.rollback().await
            .map_err(|e| AppError::Internal(format!("Failed to release snapshot: {}", e)))?;
        Ok(ledger)
    }

    async fn insert_student(&self, student: &Student) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO students ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            STUDENT_COLUMNS
        ))
        .bind(&student.id)
        .bind(&student.name)
        .bind(&student.email)
        .bind(student.total_fees)
        .bind(student.paid_amount)
        .bind(student.remaining_amount)
        .bind(student.fee_status.as_str())
        .bind(student.status.as_str())
        .bind(student.next_payment_due)
        .bind(student.created_at)
        .bind(student.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to insert student: {}", e)))?;

        Ok(())
    }

    async fn transact(&self, student_id: &str, op: &mut LedgerOp<'_>) -> Result<StudentLedger> {
        let mut tx = self.pool.begin().await
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;

        let before = Self::load_in_tx(&mut tx, student_id).await?;
        let mut ledger = before.clone();

        // Dropping `tx` on any early return rolls the transaction back
        op(&mut ledger)?;

        for slot in ledger.missing_numbers() {
            let number = next_in_tx(&mut tx, slot.prefix()).await?;
            ledger.assign_number(&slot, number)?;
        }

        ledger.check_invariants()?;

        Self::persist_in_tx(&mut tx, &before, &ledger).await?;

        tx.commit().await
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))?;

        tracing::debug!(student_id = %student_id, "Ledger transaction committed");

        Ok(ledger)
    }
}

/// Counter increment that participates in the caller's transaction
async fn next_in_tx(tx: &mut Transaction<'_, MySql>, prefix: &str) -> Result<String> {
    sqlx::query(
        r#"
        INSERT INTO sequence_counters (prefix, value) VALUES (?, LAST_INSERT_ID(1))
        ON DUPLICATE KEY UPDATE value = LAST_INSERT_ID(value + 1)
        "#,
    )
    .bind(prefix)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::Internal(format!("Failed to advance {} counter: {}", prefix, e)))?;

    let value: u64 = sqlx::query_scalar("SELECT LAST_INSERT_ID()")
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to read {} counter: {}", prefix, e)))?;

    Ok(format_sequence(prefix, value))
}

/// Standalone numbering outside a ledger transaction
#[derive(Clone)]
pub struct MySqlSequenceGenerator {
    pool: MySqlPool,
}

impl MySqlSequenceGenerator {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SequenceGenerator for MySqlSequenceGenerator {
    async fn next(&self, prefix: &str) -> Result<String> {
        let mut tx = self.pool.begin().await
            .map_err(|e| AppError::Internal(format!("Failed to start transaction: {}", e)))?;
        let number = next_in_tx(&mut tx, prefix).await?;
        tx.commit().await
            .map_err(|e| AppError::Internal(format!("Failed to commit transaction: {}", e)))?;
        Ok(number)
    }
}

async fn insert_payment(tx: &mut Transaction<'_, MySql>, p: &Payment) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO payments ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        PAYMENT_COLUMNS
    ))
    .bind(&p.id)
    .bind(&p.student_id)
    .bind(&p.course_name)
    .bind(p.total_amount)
    .bind(p.deposit_amount)
    .bind(p.remaining_amount)
    .bind(p.installment_count)
    .bind(p.status.as_str())
    .bind(p.payment_method.as_str())
    .bind(p.currency.to_string())
    .bind(p.due_date)
    .bind(p.paid_date)
    .bind(&p.invoice_number)
    .bind(&p.receipt_number)
    .bind(p.gateway_provider.map(|g| g.as_str()))
    .bind(&p.gateway_payment_id)
    .bind(&p.transaction_id)
    .bind(&p.gateway_response)
    .bind(&p.notes)
    .bind(p.created_at)
    .bind(p.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::Internal(format!("Failed to insert payment: {}", e)))?;

    Ok(())
}

async fn update_payment(tx: &mut Transaction<'_, MySql>, p: &Payment) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE payments
        SET
            course_name = ?, total_amount = ?, deposit_amount = ?, remaining_amount = ?,
            installment_count = ?, status = ?, payment_method = ?, currency = ?,
            due_date = ?, paid_date = ?, invoice_number = ?, receipt_number = ?,
            gateway_provider = ?, gateway_payment_id = ?, transaction_id = ?,
            gateway_response = ?, notes = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&p.course_name)
    .bind(p.total_amount)
    .bind(p.deposit_amount)
    .bind(p.remaining_amount)
    .bind(p.installment_count)
    .bind(p.status.as_str())
    .bind(p.payment_method.as_str())
    .bind(p.currency.to_string())
    .bind(p.due_date)
    .bind(p.paid_date)
    .bind(&p.invoice_number)
    .bind(&p.receipt_number)
    .bind(p.gateway_provider.map(|g| g.as_str()))
    .bind(&p.gateway_payment_id)
    .bind(&p.transaction_id)
    .bind(&p.gateway_response)
    .bind(&p.notes)
    .bind(p.updated_at)
    .bind(&p.id)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::Internal(format!("Failed to update payment: {}", e)))?;

    Ok(())
}

async fn insert_emi(tx: &mut Transaction<'_, MySql>, e: &EmiPayment) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO emi_payments ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        EMI_COLUMNS
    ))
    .bind(&e.id)
    .bind(&e.payment_id)
    .bind(&e.student_id)
    .bind(e.installment_number)
    .bind(e.amount)
    .bind(e.due_date)
    .bind(e.paid_date)
    .bind(e.status.as_str())
    .bind(e.payment_method.map(|m| m.as_str()))
    .bind(&e.transaction_id)
    .bind(&e.receipt_number)
    .bind(&e.gateway_payment_id)
    .bind(&e.gateway_response)
    .bind(&e.notes)
    .bind(e.created_at)
    .bind(e.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(|err| AppError::Internal(format!("Failed to insert installment: {}", err)))?;

    Ok(())
}

async fn update_emi(tx: &mut Transaction<'_, MySql>, e: &EmiPayment) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE emi_payments
        SET
            amount = ?, due_date = ?, paid_date = ?, status = ?, payment_method = ?,
            transaction_id = ?, receipt_number = ?, gateway_payment_id = ?,
            gateway_response = ?, notes = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(e.amount)
    .bind(e.due_date)
    .bind(e.paid_date)
    .bind(e.status.as_str())
    .bind(e.payment_method.map(|m| m.as_str()))
    .bind(&e.transaction_id)
    .bind(&e.receipt_number)
    .bind(&e.gateway_payment_id)
    .bind(&e.gateway_response)
    .bind(&e.notes)
    .bind(e.updated_at)
    .bind(&e.id)
    .execute(&mut **tx)
    .await
    .map_err(|err| AppError::Internal(format!("Failed to update installment: {}", err)))?;

    Ok(())
}

async fn update_student(tx: &mut Transaction<'_, MySql>, s: &Student) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE students
        SET
            name = ?, email = ?, total_fees = ?, paid_amount = ?, remaining_amount = ?,
            fee_status = ?, status = ?, next_payment_due = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&s.name)
    .bind(&s.email)
    .bind(s.total_fees)
    .bind(s.paid_amount)
    .bind(s.remaining_amount)
    .bind(s.fee_status.as_str())
    .bind(s.status.as_str())
    .bind(s.next_payment_due)
    .bind(s.updated_at)
    .bind(&s.id)
    .execute(&mut **tx)
    .await
    .map_err(|e| AppError::Internal(format!("Failed to update student: {}", e)))?;

    Ok(())
}

/// Database row representation for the students table
#[derive(sqlx::FromRow)]
struct StudentRow {
    id: String,
    name: String,
    email: Option<String>,
    total_fees: Decimal,
    paid_amount: Decimal,
    remaining_amount: Decimal,
    fee_status: String,
    status: String,
    next_payment_due: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<StudentRow> for Student {
    type Error = AppError;

    fn try_from(row: StudentRow) -> Result<Self> {
        Ok(Student {
            id: row.id,
            name: row.name,
            email: row.email,
            total_fees: row.total_fees,
            paid_amount: row.paid_amount,
            remaining_amount: row.remaining_amount,
            fee_status: row.fee_status.parse().map_err(stored_value)?,
            status: row.status.parse().map_err(stored_value)?,
            next_payment_due: row.next_payment_due,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row representation for the payments table
#[derive(sqlx::FromRow)]
struct PaymentRow {
    id: String,
    student_id: String,
    course_name: String,
    total_amount: Decimal,
    deposit_amount: Decimal,
    remaining_amount: Decimal,
    installment_count: i32,
    status: String,
    payment_method: String,
    currency: String,
    due_date: Option<NaiveDate>,
    paid_date: Option<DateTime<Utc>>,
    invoice_number: Option<String>,
    receipt_number: Option<String>,
    gateway_provider: Option<String>,
    gateway_payment_id: Option<String>,
    transaction_id: Option<String>,
    gateway_response: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = AppError;

    fn try_from(row: PaymentRow) -> Result<Self> {
        Ok(Payment {
            id: row.id,
            student_id: row.student_id,
            course_name: row.course_name,
            total_amount: row.total_amount,
            deposit_amount: row.deposit_amount,
            remaining_amount: row.remaining_amount,
            installment_count: row.installment_count,
            status: row.status.parse().map_err(stored_value)?,
            payment_method: row.payment_method.parse().map_err(stored_value)?,
            currency: row.currency.parse().map_err(stored_value)?,
            due_date: row.due_date,
            paid_date: row.paid_date,
            invoice_number: row.invoice_number,
            receipt_number: row.receipt_number,
            gateway_provider: row
                .gateway_provider
                .map(|g| g.parse::<GatewayProvider>())
                .transpose()
                .map_err(stored_value)?,
            gateway_payment_id: row.gateway_payment_id,
            transaction_id: row.transaction_id,
            gateway_response: row.gateway_response,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Database row representation for the emi_payments table
#[derive(sqlx::FromRow)]
struct EmiPaymentRow {
    id: String,
    payment_id: String,
    student_id: String,
    installment_number: i32,
    amount: Decimal,
    due_date: NaiveDate,
    paid_date: Option<DateTime<Utc>>,
    status: String,
    payment_method: Option<String>,
    transaction_id: Option<String>,
    receipt_number: Option<String>,
    gateway_payment_id: Option<String>,
    gateway_response: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EmiPaymentRow> for EmiPayment {
    type Error = AppError;

    fn try_from(row: EmiPaymentRow) -> Result<Self> {
        Ok(EmiPayment {
            id: row.id,
            payment_id: row.payment_id,
            student_id: row.student_id,
            installment_number: row.installment_number,
            amount: row.amount,
            due_date: row.due_date,
            paid_date: row.paid_date,
            status: row.status.parse().map_err(stored_value)?,
            payment_method: row
                .payment_method
                .map(|m| m.parse::<PaymentMethod>())
                .transpose()
                .map_err(stored_value)?,
            transaction_id: row.transaction_id,
            receipt_number: row.receipt_number,
            gateway_payment_id: row.gateway_payment_id,
            gateway_response: row.gateway_response,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A malformed value that is already stored is an internal problem, not a caller error
fn stored_value(err: AppError) -> AppError {
    AppError::Internal(format!("Corrupt stored value: {}", err))
}

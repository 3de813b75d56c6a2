use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::balance_aggregator::BalanceAggregator;
use super::reconciliation_engine::ReconciliationEngine;
use crate::core::{Result, AMOUNT_TOLERANCE};
use crate::modules::ledger::models::{EmiStatus, PaymentStatus, StudentBalance, StudentLedger};
use crate::modules::ledger::LedgerStore;

/// Changes made (or proposed, on a dry run) to one student's ledger
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRepair {
    pub student_id: String,
    /// Paid installments without full settlement evidence, reset to pending
    pub installments_reset: usize,
    /// Unpaid installments carrying a stale paid date or transaction id
    pub evidence_cleared: usize,
    /// Completed payments that were not actually covered
    pub payments_downgraded: usize,
    pub remaining_fixed: usize,
    pub overdue_marked: usize,
    /// Stored paid amount minus the aggregate, before repair
    pub drift: Option<Decimal>,
    pub balance: StudentBalance,
}

impl StudentRepair {
    pub fn changed(&self) -> bool {
        self.installments_reset > 0
            || self.evidence_cleared > 0
            || self.payments_downgraded > 0
            || self.remaining_fixed > 0
            || self.overdue_marked > 0
            || self.drift.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepairFailure {
    pub student_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RepairReport {
    pub dry_run: bool,
    pub students_scanned: usize,
    /// Only students whose ledger needed changes
    pub repaired: Vec<StudentRepair>,
    pub failures: Vec<RepairFailure>,
}

impl RepairReport {
    pub fn installments_reset(&self) -> usize {
        self.repaired.iter().map(|r| r.installments_reset).sum()
    }

    pub fn payments_downgraded(&self) -> usize {
        self.repaired.iter().map(|r| r.payments_downgraded).sum()
    }
}

/// Brings stored ledgers back in line with the reconciliation rules
pub struct LedgerRepair {
    store: Arc<dyn LedgerStore>,
}

impl LedgerRepair {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Repair one student, or every student when `student_id` is `None`.
    ///
    /// A dry run repairs a copy of each ledger and reports the result without
    /// writing. Failures are collected per student and do not stop the run.
    pub async fn run(&self, student_id: Option<&str>, dry_run: bool) -> Result<RepairReport> {
        let student_ids = match student_id {
            Some(id) => vec![id.to_string()],
            None => self.store.list_student_ids().await?,
        };

        let today = Utc::now().date_naive();
        let mut report = RepairReport {
            dry_run,
            ..Default::default()
        };

        for student_id in student_ids {
            report.students_scanned += 1;
            let result = if dry_run {
                self.preview(&student_id, today).await
            } else {
                self.apply(&student_id, today).await
            };

            match result {
                Ok(repair) if repair.changed() => report.repaired.push(repair),
                Ok(_) => {}
                Err(err) => {
                    error!(student_id = %student_id, error = %err, "Ledger repair failed");
                    report.failures.push(RepairFailure {
                        student_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            dry_run,
            students_scanned = report.students_scanned,
            repaired = report.repaired.len(),
            failures = report.failures.len(),
            installments_reset = report.installments_reset(),
            payments_downgraded = report.payments_downgraded(),
            "Ledger repair finished"
        );

        Ok(report)
    }

    async fn preview(&self, student_id: &str, today: NaiveDate) -> Result<StudentRepair> {
        let mut ledger = self.store.load_ledger(student_id).await?;
        let repair = Self::repair_ledger(&mut ledger, today, Utc::now());
        ledger.check_invariants()?;
        Ok(repair)
    }

    async fn apply(&self, student_id: &str, today: NaiveDate) -> Result<StudentRepair> {
        let now = Utc::now();
        let mut repair = None;
        self.store
            .transact(student_id, &mut |ledger| {
                repair = Some(Self::repair_ledger(ledger, today, now));
                Ok(())
            })
            .await?;

        let repair = repair.ok_or_else(|| {
            crate::core::AppError::internal("Repair transaction produced no result")
        })?;
        if repair.changed() {
            info!(
                student_id = %student_id,
                installments_reset = repair.installments_reset,
                payments_downgraded = repair.payments_downgraded,
                "Ledger repaired"
            );
        }
        Ok(repair)
    }

    /// Repair a ledger in place.
    ///
    /// # Business Rules
    /// - A paid installment missing any of paid date, transaction id or
    ///   gateway payment id goes back to pending
    /// - An unpaid installment keeps its gateway id but loses a stale paid
    ///   date and transaction id
    /// - A completed payment with outstanding installments or uncovered total
    ///   is rolled up again
    /// - Remaining amounts, overdue markers and the student balance are recomputed
    pub fn repair_ledger(
        ledger: &mut StudentLedger,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> StudentRepair {
        let drift = BalanceAggregator::detect_drift(ledger);
        let mut installments_reset = 0;
        let mut evidence_cleared = 0;

        for emi in ledger.emi_payments.iter_mut() {
            if emi.status == EmiStatus::Paid {
                if !emi.has_settlement_evidence() {
                    warn!(
                        emi_payment_id = %emi.id,
                        payment_id = %emi.payment_id,
                        "Paid installment without settlement evidence reset to pending"
                    );
                    emi.reset_to_pending(now);
                    installments_reset += 1;
                }
            } else if emi.paid_date.is_some() || emi.transaction_id.is_some() {
                emi.paid_date = None;
                emi.transaction_id = None;
                emi.updated_at = now;
                evidence_cleared += 1;
            }
        }

        let mut remaining_fixed = 0;
        for payment in ledger.payments.iter_mut() {
            if payment.remaining_amount != payment.total_amount - payment.deposit_amount {
                let deposit = payment.deposit_amount;
                payment.set_deposit(deposit, now);
                remaining_fixed += 1;
            }
        }

        let suspect: Vec<String> = ledger
            .payments
            .iter()
            .filter(|p| p.status == PaymentStatus::Completed)
            .filter(|p| {
                ledger.outstanding_emi_count(&p.id) > 0
                    || ledger.applied_amount(&p.id) < p.total_amount - AMOUNT_TOLERANCE
            })
            .map(|p| p.id.clone())
            .collect();

        let mut payments_downgraded = 0;
        for payment_id in &suspect {
            match ReconciliationEngine::rollup_payment_status(ledger, payment_id, now) {
                Ok(status) => {
                    warn!(
                        payment_id = %payment_id,
                        status = %status,
                        "Completed payment was not covered; status rolled up again"
                    );
                    payments_downgraded += 1;
                }
                Err(err) => error!(payment_id = %payment_id, error = %err, "Rollup failed"),
            }
        }

        let overdue_marked = ledger.refresh_overdue(today, now);
        let balance = BalanceAggregator::apply(ledger, now);

        StudentRepair {
            student_id: ledger.student.id.clone(),
            installments_reset,
            evidence_cleared,
            payments_downgraded,
            remaining_fixed,
            overdue_marked,
            drift,
            balance,
        }
    }
}

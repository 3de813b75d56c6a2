use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, error};

use crate::modules::ledger::models::{EnrollmentStatus, FeeStatus, StudentBalance, StudentLedger};

/// Derives a student's balance fields from their ledger
pub struct BalanceAggregator;

impl BalanceAggregator {
    /// Recompute every balance field from scratch.
    ///
    /// # Business Rules
    /// - `paid_amount` = deposits of payments that have not failed + paid installments
    /// - `remaining_amount` = `total_fees - paid_amount`
    /// - `fee_status`: complete when nothing remains, partial when anything
    ///   was paid, pending otherwise
    /// - `next_payment_due`: earliest pending or overdue installment, cleared
    ///   once the fees are complete
    /// - enrollment becomes `active` on completion; graduated and dropped
    ///   students keep their status
    pub fn recompute(ledger: &StudentLedger) -> StudentBalance {
        let student = &ledger.student;
        let paid_amount = ledger.aggregate_paid_amount();
        let remaining_amount = student.total_fees - paid_amount;

        let fee_status = if student.total_fees == Decimal::ZERO && paid_amount == Decimal::ZERO {
            FeeStatus::Pending
        } else if remaining_amount <= Decimal::ZERO {
            FeeStatus::Complete
        } else if paid_amount > Decimal::ZERO {
            FeeStatus::Partial
        } else {
            FeeStatus::Pending
        };

        let next_payment_due = if fee_status == FeeStatus::Complete {
            None
        } else {
            ledger
                .emi_payments
                .iter()
                .filter(|e| e.is_open())
                .map(|e| e.due_date)
                .min()
        };

        let enrollment_status = if student.status.is_final() {
            student.status
        } else if fee_status == FeeStatus::Complete {
            EnrollmentStatus::Active
        } else {
            student.status
        };

        StudentBalance {
            paid_amount,
            remaining_amount,
            fee_status,
            next_payment_due,
            enrollment_status,
        }
    }

    /// Compare the stored paid amount with the aggregate.
    ///
    /// Returns the drift (stored - aggregate) when they disagree. Only
    /// meaningful before the ledger is mutated.
    pub fn detect_drift(ledger: &StudentLedger) -> Option<Decimal> {
        let aggregate = ledger.aggregate_paid_amount();
        let stored = ledger.student.paid_amount;
        if stored == aggregate {
            return None;
        }

        error!(
            student_id = %ledger.student.id,
            stored = %stored,
            aggregate = %aggregate,
            drift = %(stored - aggregate),
            "Stored paid amount disagrees with the ledger aggregate"
        );
        Some(stored - aggregate)
    }

    /// Write the recomputed balance onto the ledger's student
    pub fn apply(ledger: &mut StudentLedger, now: DateTime<Utc>) -> StudentBalance {
        let balance = Self::recompute(ledger);
        debug!(
            student_id = %ledger.student.id,
            paid_amount = %balance.paid_amount,
            remaining_amount = %balance.remaining_amount,
            fee_status = %balance.fee_status,
            "Recomputed student balance"
        );
        ledger.student.apply_balance(&balance, now);
        balance
    }
}

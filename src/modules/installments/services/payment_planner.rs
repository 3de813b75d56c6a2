use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info};

use super::installment_calculator::InstallmentCalculator;
use crate::core::{AppError, Currency, Result};
use crate::modules::installments::models::{
    CreatePaymentRequest, PlannedPayment, ScheduledInstallment,
};
use crate::modules::ledger::models::{EmiPayment, Payment};
use crate::modules::ledger::LedgerStore;
use crate::modules::reconciliation::services::BalanceAggregator;

/// Registers fee obligations together with their installment plans
pub struct PaymentPlanner {
    store: Arc<dyn LedgerStore>,
    default_currency: Currency,
}

impl PaymentPlanner {
    pub fn new(store: Arc<dyn LedgerStore>, default_currency: Currency) -> Self {
        Self {
            store,
            default_currency,
        }
    }

    /// Create a payment and its installments in one transaction
    ///
    /// # Arguments
    /// * `request` - Amounts, deposit and either an explicit schedule or an
    ///   installment count projected monthly from `due_date`
    ///
    /// # Returns
    /// * `Result<PlannedPayment>` - The persisted payment with its numbered invoice
    ///
    /// # Business Rules
    /// - Status starts completed when the deposit covers the total, partial
    ///   with a deposit, pending otherwise
    /// - Installments are created only for a positive remaining amount, and
    ///   always start pending whatever the deposit
    /// - The student's total fees are set from this payment when still zero;
    ///   the balance reflects the deposit only
    pub async fn create_payment(&self, mut request: CreatePaymentRequest) -> Result<PlannedPayment> {
        request.currency.get_or_insert(self.default_currency);
        request.validate()?;

        let now = Utc::now();
        let schedule = Self::plan_schedule(&request)?;
        let installment_count = if schedule.is_empty() {
            1
        } else {
            schedule.len() as i32
        };

        let mut payment = Payment::new(
            request.student_id.clone(),
            request.course_name.clone(),
            request.total_amount,
            request.deposit_amount,
            installment_count,
            request.currency(),
            now,
        )?;
        payment.due_date = request
            .due_date
            .or_else(|| schedule.first().map(|s| s.due_date));
        payment.payment_method = request.payment_method;
        payment.notes = request.notes.clone();
        if payment.deposit_amount > Decimal::ZERO {
            payment.paid_date = Some(now);
        }
        payment.validate()?;

        let installments = schedule
            .iter()
            .map(|s| {
                EmiPayment::new(
                    payment.id.clone(),
                    payment.student_id.clone(),
                    s.installment_number,
                    s.amount,
                    s.due_date,
                    now,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let payment_id = payment.id.clone();
        let ledger = self
            .store
            .transact(&request.student_id, &mut |ledger| {
                if ledger.student.total_fees == Decimal::ZERO {
                    ledger.student.total_fees = payment.total_amount;
                }
                ledger.add_payment(payment.clone(), installments.clone());
                BalanceAggregator::apply(ledger, now);
                Ok(())
            })
            .await?;

        let payment = ledger
            .payment(&payment_id)
            .cloned()
            .ok_or_else(|| AppError::internal("Created payment missing after commit"))?;
        let installments: Vec<EmiPayment> =
            ledger.emis_for(&payment_id).into_iter().cloned().collect();

        info!(
            payment_id = %payment.id,
            student_id = %payment.student_id,
            invoice_number = payment.invoice_number.as_deref().unwrap_or("-"),
            total = %payment.total_amount,
            deposit = %payment.deposit_amount,
            installments = installments.len(),
            status = %payment.status,
            "Payment registered"
        );

        Ok(PlannedPayment {
            payment,
            installments,
        })
    }

    fn plan_schedule(request: &CreatePaymentRequest) -> Result<Vec<ScheduledInstallment>> {
        let remaining = request.remaining_amount();

        if remaining <= Decimal::ZERO || !request.wants_installments() {
            if request.wants_installments() {
                debug!(
                    student_id = %request.student_id,
                    "Deposit covers the total; no installments created"
                );
            }
            return Ok(Vec::new());
        }

        if !request.installments.is_empty() {
            return InstallmentCalculator::validate_explicit(
                &request.installments,
                remaining,
                request.currency(),
            );
        }

        let count = request.installment_count.unwrap_or(1);
        let first_due = request.due_date.ok_or_else(|| {
            AppError::validation("A due date is required to project installments")
        })?;

        InstallmentCalculator::build_schedule(remaining, count, first_due, request.currency())
    }
}

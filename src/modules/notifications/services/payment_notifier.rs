use async_trait::async_trait;
use tracing::info;

use crate::modules::ledger::models::{EmiPayment, Payment, Student};

/// Receives finalized payment state after a reconciliation is committed.
///
/// Nothing returned here feeds back into the ledger.
#[async_trait]
pub trait PaymentNotifier: Send + Sync {
    async fn payment_reconciled(
        &self,
        payment: &Payment,
        installment: Option<&EmiPayment>,
        student: &Student,
    );
}

/// Default notifier: writes a structured log line per reconciliation
#[derive(Debug, Default, Clone)]
pub struct TracingNotifier;

#[async_trait]
impl PaymentNotifier for TracingNotifier {
    async fn payment_reconciled(
        &self,
        payment: &Payment,
        installment: Option<&EmiPayment>,
        student: &Student,
    ) {
        info!(
            student_id = %student.id,
            payment_id = %payment.id,
            emi_payment_id = installment.map(|e| e.id.as_str()).unwrap_or("-"),
            receipt_number = installment
                .and_then(|e| e.receipt_number.as_deref())
                .or(payment.receipt_number.as_deref())
                .unwrap_or("-"),
            payment_status = %payment.status,
            fee_status = %student.fee_status,
            paid_amount = %student.paid_amount,
            remaining_amount = %student.remaining_amount,
            "Payment reconciled"
        );
    }
}

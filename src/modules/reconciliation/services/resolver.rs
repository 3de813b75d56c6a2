use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::{AppError, Result};
use crate::modules::ledger::models::{EmiPayment, Payment};
use crate::modules::ledger::LedgerStore;
use crate::modules::reconciliation::models::{PaymentEvent, ReconciliationTarget};

/// Where an event should be applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTarget {
    pub student_id: String,
    pub target: ReconciliationTarget,
}

impl ResolvedTarget {
    pub fn payment(payment: &Payment) -> Self {
        Self {
            student_id: payment.student_id.clone(),
            target: ReconciliationTarget::Payment {
                payment_id: payment.id.clone(),
            },
        }
    }

    pub fn emi(emi: &EmiPayment) -> Self {
        Self {
            student_id: emi.student_id.clone(),
            target: ReconciliationTarget::EmiPayment {
                emi_payment_id: emi.id.clone(),
                payment_id: emi.payment_id.clone(),
            },
        }
    }
}

/// Prioritized lookup chains from a gateway event to a ledger entity.
///
/// Gateway metadata is not always propagated, so each chain falls back from
/// exact ids to the student's open records. Every step is logged.
pub struct LedgerResolver {
    store: Arc<dyn LedgerStore>,
}

impl LedgerResolver {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Decide whether the event settles an installment or a payment.
    ///
    /// An installment is targeted when the event names one, or when an
    /// installment (and no payment) owns the gateway id.
    pub async fn resolve(&self, event: &PaymentEvent) -> Result<ResolvedTarget> {
        if event.metadata.emi_payment_id.is_some() {
            return self.resolve_emi(event).await.map(|emi| ResolvedTarget::emi(&emi));
        }

        let by_gateway = self
            .store
            .find_payment_by_gateway_id(&event.gateway_payment_id)
            .await?;

        if by_gateway.is_none() {
            if let Some(emi) = self
                .store
                .find_emi_by_gateway_id(&event.gateway_payment_id)
                .await?
            {
                debug!(
                    gateway_payment_id = %event.gateway_payment_id,
                    emi_payment_id = %emi.id,
                    "Gateway id belongs to an installment"
                );
                return Ok(ResolvedTarget::emi(&emi));
            }
        }

        self.resolve_payment_from(event, by_gateway)
            .await
            .map(|payment| ResolvedTarget::payment(&payment))
    }

    /// gateway id -> metadata payment id -> student's latest open payment
    pub async fn resolve_payment(&self, event: &PaymentEvent) -> Result<Payment> {
        let by_gateway = self
            .store
            .find_payment_by_gateway_id(&event.gateway_payment_id)
            .await?;
        self.resolve_payment_from(event, by_gateway).await
    }

    async fn resolve_payment_from(
        &self,
        event: &PaymentEvent,
        by_gateway: Option<Payment>,
    ) -> Result<Payment> {
        let metadata = &event.metadata;
        let mut attempted = vec![format!("gatewayPaymentId={}", event.gateway_payment_id)];

        if let Some(payment) = by_gateway {
            debug!(
                gateway_payment_id = %event.gateway_payment_id,
                payment_id = %payment.id,
                "Resolved payment by gateway id"
            );
            if let Some(named) = metadata.payment_id.as_deref() {
                if named != payment.id {
                    warn!(
                        gateway_payment_id = %event.gateway_payment_id,
                        payment_id = %payment.id,
                        metadata_payment_id = %named,
                        "Gateway id and metadata name different payments; using the gateway match"
                    );
                }
            }
            return Ok(payment);
        }
        debug!(gateway_payment_id = %event.gateway_payment_id, "No payment owns the gateway id");

        if let Some(payment_id) = metadata.payment_id.as_deref() {
            attempted.push(format!("paymentId={}", payment_id));
            if let Some(payment) = self.store.find_payment(payment_id).await? {
                debug!(payment_id = %payment.id, "Resolved payment by metadata id");
                if let Some(student_id) = metadata.student_id.as_deref() {
                    if student_id != payment.student_id {
                        warn!(
                            payment_id = %payment.id,
                            student_id = %payment.student_id,
                            metadata_student_id = %student_id,
                            "Metadata student does not own the payment"
                        );
                    }
                }
                return Ok(payment);
            }
            debug!(payment_id = %payment_id, "Metadata payment id not found");
        }

        if let Some(student_id) = metadata.student_id.as_deref() {
            attempted.push(format!("studentId={} (latest open payment)", student_id));
            if let Some(payment) = self.store.find_latest_open_payment(student_id).await? {
                warn!(
                    gateway_payment_id = %event.gateway_payment_id,
                    student_id = %student_id,
                    payment_id = %payment.id,
                    "Resolved payment by student fallback"
                );
                return Ok(payment);
            }
            debug!(student_id = %student_id, "Student has no open payment");
        }

        Err(AppError::not_found("Payment", attempted.join(", ")))
    }

    /// metadata installment id -> gateway id -> student's earliest open installment
    pub async fn resolve_emi(&self, event: &PaymentEvent) -> Result<EmiPayment> {
        let metadata = &event.metadata;
        let mut attempted = Vec::new();

        if let Some(emi_payment_id) = metadata.emi_payment_id.as_deref() {
            attempted.push(format!("emiPaymentId={}", emi_payment_id));
            if let Some(emi) = self.store.find_emi_payment(emi_payment_id).await? {
                debug!(emi_payment_id = %emi.id, "Resolved installment by metadata id");
                return Ok(emi);
            }
            debug!(emi_payment_id = %emi_payment_id, "Metadata installment id not found");
        }

        attempted.push(format!("gatewayPaymentId={}", event.gateway_payment_id));
        if let Some(emi) = self
            .store
            .find_emi_by_gateway_id(&event.gateway_payment_id)
            .await?
        {
            debug!(
                gateway_payment_id = %event.gateway_payment_id,
                emi_payment_id = %emi.id,
                "Resolved installment by gateway id"
            );
            return Ok(emi);
        }

        if let Some(student_id) = metadata.student_id.as_deref() {
            attempted.push(format!("studentId={} (earliest open installment)", student_id));
            if let Some(emi) = self.store.find_earliest_open_emi(student_id).await? {
                warn!(
                    gateway_payment_id = %event.gateway_payment_id,
                    student_id = %student_id,
                    emi_payment_id = %emi.id,
                    "Resolved installment by student fallback"
                );
                return Ok(emi);
            }
            debug!(student_id = %student_id, "Student has no open installment");
        }

        Err(AppError::not_found("EMIPayment", attempted.join(", ")))
    }
}

use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use super::balance_aggregator::BalanceAggregator;
use super::reconciliation_engine::{EngineOutcome, ReconciliationEngine};
use super::resolver::{LedgerResolver, ResolvedTarget};
use crate::core::{AppError, Result};
use crate::modules::gateways::services::{GatewayEventKind, IntentStatus, PaymentGateway};
use crate::modules::ledger::models::{
    EmiPayment, Payment, PaymentStatus, StudentBalance, StudentLedger,
};
use crate::modules::ledger::LedgerStore;
use crate::modules::notifications::PaymentNotifier;
use crate::modules::reconciliation::models::{
    Disposition, ManualConfirmation, PaymentEvent, ReconciliationOutcome, ReconciliationTarget,
    WebhookAck,
};

/// Drives the reconciliation engine from gateway deliveries, operator
/// confirmations and admin edits.
///
/// Each operation resolves its target outside the lock and then runs exactly
/// one store transaction, so concurrent events for a student serialize.
pub struct ReconciliationService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn PaymentNotifier>,
    resolver: LedgerResolver,
    webhook_secret: String,
}

impl ReconciliationService {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn PaymentNotifier>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            resolver: LedgerResolver::new(store.clone()),
            store,
            gateway,
            notifier,
            webhook_secret: webhook_secret.into(),
        }
    }

    /// Verify and apply a webhook delivery.
    ///
    /// # Arguments
    /// * `raw_body` - Request body exactly as received
    /// * `signature_header` - Value of the gateway signature header
    ///
    /// # Returns
    /// The acknowledgement body. Signature and gateway errors propagate so
    /// the caller answers with a non-2xx status and the gateway redelivers.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<WebhookAck> {
        let event =
            self.gateway
                .verify_and_parse_event(raw_body, signature_header, &self.webhook_secret)?;

        info!(
            event_id = %event.id,
            gateway_payment_id = event.intent.as_ref().map(|i| i.id.as_str()).unwrap_or("-"),
            event_kind = ?event.kind,
            "Webhook received"
        );

        let outcome = match (&event.kind, &event.intent) {
            (GatewayEventKind::PaymentSucceeded, Some(intent)) => {
                let payment_event = PaymentEvent::from_intent(intent, self.gateway.name())?;
                Some(self.apply_success(&payment_event, false).await?)
            }
            (GatewayEventKind::PaymentFailed, Some(intent)) => {
                let payment_event = PaymentEvent::from_intent(intent, self.gateway.name())?;
                Some(self.apply_failure(&payment_event).await?)
            }
            (GatewayEventKind::PaymentSucceeded | GatewayEventKind::PaymentFailed, None) => {
                return Err(AppError::gateway(format!(
                    "Event {} does not carry a payment intent",
                    event.id
                )));
            }
            (GatewayEventKind::Other(event_type), _) => {
                info!(event_type = %event_type, "Ignoring webhook event type");
                None
            }
        };

        Ok(WebhookAck {
            received: true,
            disposition: outcome
                .as_ref()
                .map(|o| o.disposition)
                .unwrap_or(Disposition::Ignored),
            outcome,
        })
    }

    /// Resolve and apply a success event
    pub async fn apply_success(
        &self,
        event: &PaymentEvent,
        force_override: bool,
    ) -> Result<ReconciliationOutcome> {
        let resolved = self.resolver.resolve(event).await?;
        self.apply_resolved(resolved, event, force_override).await
    }

    /// Resolve a failure event and record its diagnostics
    pub async fn apply_failure(&self, event: &PaymentEvent) -> Result<ReconciliationOutcome> {
        let resolved = self.resolver.resolve(event).await?;
        let now = Utc::now();
        let mut outcome = None;

        self.store
            .transact(&resolved.student_id, &mut |ledger| {
                outcome = Some(ReconciliationEngine::apply_failure(
                    ledger,
                    &resolved.target,
                    event,
                    now,
                )?);
                Ok(())
            })
            .await?;

        Ok(Self::outcome(resolved, outcome))
    }

    /// Apply an intent that succeeded without a usable webhook.
    ///
    /// # Business Rules
    /// - The gateway must report the intent as `succeeded`; anything else is
    ///   rejected with the intent's current status
    /// - The ids in the request override the intent's metadata
    /// - `force_override` bypasses the deposit lock on installments
    pub async fn confirm_manually(
        &self,
        confirmation: &ManualConfirmation,
    ) -> Result<ReconciliationOutcome> {
        confirmation.validate()?;

        let intent = self
            .gateway
            .retrieve_intent(&confirmation.gateway_payment_id)
            .await?;
        if intent.status != IntentStatus::Succeeded {
            return Err(AppError::invalid_state(
                format!("Gateway intent {} has not succeeded", intent.id),
                intent.status,
            ));
        }

        let mut event = PaymentEvent::from_intent(&intent, self.gateway.name())?;

        let resolved = if let Some(emi_payment_id) = confirmation.emi_payment_id.as_deref() {
            let emi = self.store.find_emi_payment(emi_payment_id).await?.ok_or_else(|| {
                AppError::not_found("EMIPayment", format!("emiPaymentId={}", emi_payment_id))
            })?;
            Self::warn_on_metadata_mismatch(
                "emiPaymentId",
                event.metadata.emi_payment_id.as_deref(),
                &emi.id,
            );
            event.metadata.emi_payment_id = Some(emi.id.clone());
            event.metadata.payment_id = Some(emi.payment_id.clone());
            ResolvedTarget::emi(&emi)
        } else {
            let payment_id = confirmation.payment_id.as_deref().unwrap_or_default();
            let payment = self.store.find_payment(payment_id).await?.ok_or_else(|| {
                AppError::not_found("Payment", format!("paymentId={}", payment_id))
            })?;
            Self::warn_on_metadata_mismatch(
                "paymentId",
                event.metadata.payment_id.as_deref(),
                &payment.id,
            );
            event.metadata.payment_id = Some(payment.id.clone());
            event.metadata.emi_payment_id = None;
            ResolvedTarget::payment(&payment)
        };
        event.metadata.student_id = Some(resolved.student_id.clone());

        info!(
            gateway_payment_id = %event.gateway_payment_id,
            student_id = %resolved.student_id,
            force_override = confirmation.force_override,
            "Manual confirmation"
        );

        self.apply_resolved(resolved, &event, confirmation.force_override)
            .await
    }

    /// Recompute and store a student's balance fields
    pub async fn recompute_student_balance(&self, student_id: &str) -> Result<StudentBalance> {
        let now = Utc::now();
        let ledger = self
            .store
            .transact(student_id, &mut |ledger| {
                BalanceAggregator::detect_drift(ledger);
                BalanceAggregator::apply(ledger, now);
                Ok(())
            })
            .await?;

        Ok(ledger.student.balance())
    }

    /// Explicitly fail or refund a payment
    pub async fn update_payment_status(
        &self,
        payment_id: &str,
        status: PaymentStatus,
    ) -> Result<Payment> {
        if !status.is_terminal() {
            return Err(AppError::validation(format!(
                "Only failed or refunded can be set explicitly, got {}",
                status
            )));
        }

        let payment = self.require_payment(payment_id).await?;
        let now = Utc::now();
        let ledger = self
            .store
            .transact(&payment.student_id, &mut |ledger| {
                BalanceAggregator::detect_drift(ledger);
                ledger.require_payment_mut(payment_id)?.set_status(status, now);
                BalanceAggregator::apply(ledger, now);
                Ok(())
            })
            .await?;

        info!(payment_id = %payment_id, status = %status, "Payment status set explicitly");
        Self::payment_from(&ledger, payment_id)
    }

    /// Cancel an unpaid installment
    pub async fn cancel_emi_payment(&self, emi_payment_id: &str) -> Result<EmiPayment> {
        let emi = self.require_emi(emi_payment_id).await?;
        let now = Utc::now();
        let ledger = self
            .store
            .transact(&emi.student_id, &mut |ledger| {
                BalanceAggregator::detect_drift(ledger);
                ledger.require_emi_mut(emi_payment_id)?.cancel(now)?;
                ReconciliationEngine::rollup_payment_status(ledger, &emi.payment_id, now)?;
                BalanceAggregator::apply(ledger, now);
                Ok(())
            })
            .await?;

        info!(emi_payment_id = %emi_payment_id, "Installment cancelled");
        ledger
            .emi(emi_payment_id)
            .cloned()
            .ok_or_else(|| AppError::internal("Cancelled installment missing after commit"))
    }

    /// Delete a payment with its installments and reverse its balance impact
    pub async fn delete_payment(&self, payment_id: &str) -> Result<Payment> {
        let payment = self.require_payment(payment_id).await?;
        let now = Utc::now();
        let mut removed = None;

        self.store
            .transact(&payment.student_id, &mut |ledger| {
                BalanceAggregator::detect_drift(ledger);
                let (payment, installments) = ledger.remove_payment(payment_id)?;
                BalanceAggregator::apply(ledger, now);
                removed = Some((payment, installments.len()));
                Ok(())
            })
            .await?;

        let (payment, installment_count) =
            removed.ok_or_else(|| AppError::internal("Payment removal produced no result"))?;
        info!(
            payment_id = %payment.id,
            student_id = %payment.student_id,
            installments = installment_count,
            "Payment deleted"
        );
        Ok(payment)
    }

    /// Flag a student's pending installments that are past due.
    /// Returns how many changed.
    pub async fn mark_overdue(&self, student_id: &str, today: NaiveDate) -> Result<usize> {
        let now = Utc::now();
        let mut changed = 0;

        self.store
            .transact(student_id, &mut |ledger| {
                changed = ledger.refresh_overdue(today, now);
                if changed > 0 {
                    BalanceAggregator::apply(ledger, now);
                }
                Ok(())
            })
            .await?;

        if changed > 0 {
            info!(student_id = %student_id, installments = changed, "Installments marked overdue");
        }
        Ok(changed)
    }

    async fn apply_resolved(
        &self,
        resolved: ResolvedTarget,
        event: &PaymentEvent,
        force_override: bool,
    ) -> Result<ReconciliationOutcome> {
        let now = Utc::now();
        let mut outcome = None;

        let ledger = self
            .store
            .transact(&resolved.student_id, &mut |ledger| {
                let applied = match &resolved.target {
                    ReconciliationTarget::Payment { payment_id } => {
                        ReconciliationEngine::apply_payment_success(ledger, payment_id, event, now)?
                    }
                    ReconciliationTarget::EmiPayment { emi_payment_id, .. } => {
                        ReconciliationEngine::apply_emi_success(
                            ledger,
                            emi_payment_id,
                            event,
                            force_override,
                            now,
                        )?
                    }
                };
                outcome = Some(applied);
                Ok(())
            })
            .await?;

        let outcome = Self::outcome(resolved, outcome);
        if outcome.disposition == Disposition::Applied {
            self.notify(&ledger, &outcome.target).await;
        }
        Ok(outcome)
    }

    async fn notify(&self, ledger: &StudentLedger, target: &ReconciliationTarget) {
        let (payment_id, emi) = match target {
            ReconciliationTarget::Payment { payment_id } => (payment_id.as_str(), None),
            ReconciliationTarget::EmiPayment {
                emi_payment_id,
                payment_id,
            } => (payment_id.as_str(), ledger.emi(emi_payment_id)),
        };

        match ledger.payment(payment_id) {
            Some(payment) => {
                self.notifier
                    .payment_reconciled(payment, emi, &ledger.student)
                    .await
            }
            None => warn!(payment_id = %payment_id, "Reconciled payment missing from ledger"),
        }
    }

    fn outcome(resolved: ResolvedTarget, outcome: Option<EngineOutcome>) -> ReconciliationOutcome {
        let outcome = outcome.unwrap_or(EngineOutcome {
            disposition: Disposition::Ignored,
            classification: None,
        });
        ReconciliationOutcome {
            disposition: outcome.disposition,
            student_id: resolved.student_id,
            target: resolved.target,
            classification: outcome.classification,
        }
    }

    fn warn_on_metadata_mismatch(key: &str, metadata: Option<&str>, requested: &str) {
        if let Some(value) = metadata {
            if value != requested {
                warn!(
                    key = %key,
                    metadata = %value,
                    requested = %requested,
                    "Intent metadata names a different record; using the requested one"
                );
            }
        }
    }

    async fn require_payment(&self, payment_id: &str) -> Result<Payment> {
        self.store
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Payment", format!("paymentId={}", payment_id)))
    }

    async fn require_emi(&self, emi_payment_id: &str) -> Result<EmiPayment> {
        self.store
            .find_emi_payment(emi_payment_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found("EMIPayment", format!("emiPaymentId={}", emi_payment_id))
            })
    }

    fn payment_from(ledger: &StudentLedger, payment_id: &str) -> Result<Payment> {
        ledger
            .payment(payment_id)
            .cloned()
            .ok_or_else(|| AppError::internal("Updated payment missing after commit"))
    }
}

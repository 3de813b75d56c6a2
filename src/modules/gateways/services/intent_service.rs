use chrono::Utc;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use super::gateway_trait::{
    PaymentGateway, META_EMI_PAYMENT_ID, META_PAYMENT_ID, META_STUDENT_ID,
};
use crate::core::{AppError, Currency, Result};
use crate::modules::ledger::models::PaymentStatus;
use crate::modules::ledger::LedgerStore;

/// Client-facing handle for completing a gateway charge
#[derive(Debug, Clone, Serialize)]
pub struct IntentResponse {
    pub intent_id: String,
    pub client_secret: String,
    pub amount: Decimal,
    pub currency: Currency,
}

/// Opens gateway intents for payments and installments
pub struct IntentService {
    store: Arc<dyn LedgerStore>,
    gateway: Arc<dyn PaymentGateway>,
}

impl IntentService {
    pub fn new(store: Arc<dyn LedgerStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self { store, gateway }
    }

    /// Charge whatever is still outstanding on a payment
    ///
    /// # Business Rules
    /// - Outstanding = total - (deposit + paid installments); must be positive
    /// - Completed, failed and refunded payments cannot be charged
    /// - The payment moves to `processing` and records the intent id
    pub async fn create_payment_intent(&self, payment_id: &str) -> Result<IntentResponse> {
        let payment = self
            .store
            .find_payment(payment_id)
            .await?
            .ok_or_else(|| AppError::not_found("Payment", format!("paymentId={}", payment_id)))?;

        if !payment.status.is_open() {
            return Err(AppError::invalid_state(
                format!("Payment {} cannot be charged", payment.id),
                payment.status,
            ));
        }

        let ledger = self.store.load_ledger(&payment.student_id).await?;
        let outstanding = payment.total_amount - ledger.applied_amount(&payment.id);
        if outstanding <= Decimal::ZERO {
            return Err(AppError::invalid_state(
                format!("Payment {} has nothing outstanding", payment.id),
                payment.status,
            ));
        }

        let amount_minor = payment.currency.to_minor_units(outstanding)?;
        let metadata = HashMap::from([
            (META_PAYMENT_ID.to_string(), payment.id.clone()),
            (META_STUDENT_ID.to_string(), payment.student_id.clone()),
        ]);
        let idempotency_key = format!("payment:{}:{}", payment.id, amount_minor);

        let intent = self
            .gateway
            .create_intent(amount_minor, payment.currency, &metadata, &idempotency_key)
            .await?;

        let provider = self.gateway.name();
        let intent_id = intent.id.clone();
        self.store
            .transact(&payment.student_id, &mut |ledger| {
                let now = Utc::now();
                let payment = ledger.require_payment_mut(payment_id)?;
                if !payment.status.is_open() {
                    return Err(AppError::invalid_state(
                        format!("Payment {} changed while the intent was created", payment.id),
                        payment.status,
                    ));
                }
                payment.gateway_payment_id = Some(intent_id.clone());
                payment.gateway_provider = Some(provider);
                payment.set_status(PaymentStatus::Processing, now);
                Ok(())
            })
            .await?;

        info!(
            payment_id = %payment.id,
            student_id = %payment.student_id,
            gateway_payment_id = %intent.id,
            amount = %outstanding,
            "Payment intent opened"
        );

        Ok(IntentResponse {
            intent_id: intent.id,
            client_secret: intent.client_secret,
            amount: outstanding,
            currency: payment.currency,
        })
    }

    /// Charge a single installment
    ///
    /// # Business Rules
    /// - Only pending, overdue or processing installments can be charged
    /// - The installment moves to `processing` and records the intent id
    pub async fn create_emi_payment_intent(&self, emi_payment_id: &str) -> Result<IntentResponse> {
        let emi = self
            .store
            .find_emi_payment(emi_payment_id)
            .await?
            .ok_or_else(|| {
                AppError::not_found("EMIPayment", format!("emiPaymentId={}", emi_payment_id))
            })?;

        if !emi.is_outstanding() {
            return Err(AppError::invalid_state(
                format!("Installment {} cannot be charged", emi.id),
                emi.status,
            ));
        }

        let currency = self
            .store
            .find_payment(&emi.payment_id)
            .await?
            .map(|p| p.currency)
            .unwrap_or_default();

        let amount_minor = currency.to_minor_units(emi.amount)?;
        let metadata = HashMap::from([
            (META_EMI_PAYMENT_ID.to_string(), emi.id.clone()),
            (META_PAYMENT_ID.to_string(), emi.payment_id.clone()),
            (META_STUDENT_ID.to_string(), emi.student_id.clone()),
        ]);
        let idempotency_key = format!("emi:{}:{}", emi.id, amount_minor);

        let intent = self
            .gateway
            .create_intent(amount_minor, currency, &metadata, &idempotency_key)
            .await?;

        let intent_id = intent.id.clone();
        self.store
            .transact(&emi.student_id, &mut |ledger| {
                ledger
                    .require_emi_mut(emi_payment_id)?
                    .mark_processing(intent_id.clone(), Utc::now())
            })
            .await?;

        info!(
            emi_payment_id = %emi.id,
            payment_id = %emi.payment_id,
            student_id = %emi.student_id,
            gateway_payment_id = %intent.id,
            amount = %emi.amount,
            "Installment intent opened"
        );

        Ok(IntentResponse {
            intent_id: intent.id,
            client_secret: intent.client_secret,
            amount: emi.amount,
            currency,
        })
    }
}

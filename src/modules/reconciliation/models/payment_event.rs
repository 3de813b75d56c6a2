use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Currency, Result};
use crate::modules::gateways::services::{
    GatewayIntent, META_EMI_PAYMENT_ID, META_PAYMENT_ID, META_STUDENT_ID,
};
use crate::modules::ledger::models::GatewayProvider;

/// Ids an intent carried back from the gateway
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub payment_id: Option<String>,
    pub emi_payment_id: Option<String>,
    pub student_id: Option<String>,
}

impl EventMetadata {
    fn from_intent(intent: &GatewayIntent) -> Self {
        Self {
            payment_id: intent.metadata_value(META_PAYMENT_ID).map(str::to_string),
            emi_payment_id: intent
                .metadata_value(META_EMI_PAYMENT_ID)
                .map(str::to_string),
            student_id: intent.metadata_value(META_STUDENT_ID).map(str::to_string),
        }
    }
}

/// A gateway outcome in ledger terms (major units, resolved metadata)
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentEvent {
    pub gateway_payment_id: String,
    pub amount: Decimal,
    pub currency: Currency,
    pub provider: GatewayProvider,
    pub metadata: EventMetadata,
    /// Raw gateway payload stored as diagnostics
    pub gateway_response: Option<String>,
    pub failure_message: Option<String>,
}

impl PaymentEvent {
    /// Convert a gateway intent at the boundary; amounts leave minor units here
    pub fn from_intent(intent: &GatewayIntent, provider: GatewayProvider) -> Result<Self> {
        if intent.id.trim().is_empty() {
            return Err(AppError::gateway("Gateway intent has no id"));
        }
        if intent.amount_minor < 0 {
            return Err(AppError::gateway(format!(
                "Gateway intent {} reports a negative amount",
                intent.id
            )));
        }

        Ok(Self {
            gateway_payment_id: intent.id.clone(),
            amount: intent.currency.from_minor_units(intent.amount_minor),
            currency: intent.currency,
            provider,
            metadata: EventMetadata::from_intent(intent),
            gateway_response: intent.raw_response.clone(),
            failure_message: intent.last_error.clone(),
        })
    }
}

/// Administrator request to apply an intent that succeeded out of band
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualConfirmation {
    pub payment_id: Option<String>,
    pub emi_payment_id: Option<String>,
    pub gateway_payment_id: String,
    /// Bypass the deposit-lock guard on installments
    #[serde(default)]
    pub force_override: bool,
}

impl ManualConfirmation {
    pub fn validate(&self) -> Result<()> {
        if self.gateway_payment_id.trim().is_empty() {
            return Err(AppError::validation("Gateway payment id is required"));
        }

        let has_payment = self.payment_id.as_deref().is_some_and(|s| !s.trim().is_empty());
        let has_emi = self
            .emi_payment_id
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty());
        if has_payment == has_emi {
            return Err(AppError::validation(
                "Exactly one of payment_id or emi_payment_id is required",
            ));
        }

        Ok(())
    }
}

/// How a success event relates to the payment it landed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentClassification {
    DepositOnly,
    FullPayment,
    PartialOther,
}

impl PaymentClassification {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DepositOnly => "deposit_only",
            Self::FullPayment => "full_payment",
            Self::PartialOther => "partial_other",
        }
    }
}

impl std::fmt::Display for PaymentClassification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What a reconciliation did to the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Applied,
    /// Event already applied; nothing changed
    Duplicate,
    FailureRecorded,
    /// Event type the ledger does not act on
    Ignored,
}

/// Entity a reconciliation landed on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconciliationTarget {
    Payment { payment_id: String },
    EmiPayment { emi_payment_id: String, payment_id: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationOutcome {
    pub disposition: Disposition,
    pub student_id: String,
    pub target: ReconciliationTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<PaymentClassification>,
}

/// Body returned to the gateway for a webhook delivery
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
    pub received: bool,
    pub disposition: Disposition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<ReconciliationOutcome>,
}

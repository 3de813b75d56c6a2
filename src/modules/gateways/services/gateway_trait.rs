use crate::core::{AppError, Currency, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::modules::ledger::models::GatewayProvider;

/// Metadata key carrying the payment id on an intent
pub const META_PAYMENT_ID: &str = "paymentId";
/// Metadata key carrying the installment id on an intent
pub const META_EMI_PAYMENT_ID: &str = "emiPaymentId";
/// Metadata key carrying the student id on an intent
pub const META_STUDENT_ID: &str = "studentId";

/// Payment gateway port used by the intent and reconciliation services.
///
/// Amounts crossing this boundary are integer minor units (paisa, cents).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a payment intent.
    ///
    /// `idempotency_key` makes retried requests return the same intent.
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: Currency,
        metadata: &HashMap<String, String>,
        idempotency_key: &str,
    ) -> Result<CreatedIntent>;

    /// Fetch the current state of an intent
    async fn retrieve_intent(&self, intent_id: &str) -> Result<GatewayIntent>;

    /// Verify a webhook signature and parse the event.
    ///
    /// Fails with `SignatureVerification` when the signature does not match.
    fn verify_and_parse_event(
        &self,
        raw_body: &[u8],
        signature_header: &str,
        webhook_secret: &str,
    ) -> Result<GatewayEvent>;

    /// Provider recorded on payments collected through this gateway
    fn name(&self) -> GatewayProvider;
}

/// Intent created on the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedIntent {
    pub id: String,
    /// Handed to the client to complete the payment
    pub client_secret: String,
}

/// Intent state as reported by the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayIntent {
    pub id: String,
    pub status: IntentStatus,
    pub amount_minor: i64,
    pub currency: Currency,
    pub metadata: HashMap<String, String>,
    /// Failure message from the last charge attempt
    pub last_error: Option<String>,
    /// Raw gateway payload, kept for diagnostics
    pub raw_response: Option<String>,
}

impl GatewayIntent {
    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

/// Gateway-side intent lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    RequiresCapture,
    Canceled,
    Succeeded,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
        }
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for IntentStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "requires_payment_method" => Ok(Self::RequiresPaymentMethod),
            "requires_confirmation" => Ok(Self::RequiresConfirmation),
            "requires_action" => Ok(Self::RequiresAction),
            "processing" => Ok(Self::Processing),
            "requires_capture" => Ok(Self::RequiresCapture),
            "canceled" => Ok(Self::Canceled),
            "succeeded" => Ok(Self::Succeeded),
            _ => Err(AppError::gateway(format!(
                "Unknown intent status: {}",
                value
            ))),
        }
    }
}

/// Verified webhook event
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub id: String,
    pub kind: GatewayEventKind,
    /// Present for `payment_intent.*` events only
    pub intent: Option<GatewayIntent>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEventKind {
    PaymentSucceeded,
    PaymentFailed,
    /// Any event type the ledger does not act on
    Other(String),
}

impl GatewayEventKind {
    pub fn from_type(event_type: &str) -> Self {
        match event_type {
            "payment_intent.succeeded" => Self::PaymentSucceeded,
            "payment_intent.payment_failed" => Self::PaymentFailed,
            other => Self::Other(other.to_string()),
        }
    }
}

// Scripted payment gateway
//
// Intents live in memory; their status is set by the test. Webhook
// verification goes through the real Stripe signature check.

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;
use std::sync::Mutex;

use feeledger::core::{AppError, Currency, Result};
use feeledger::gateways::services::stripe::SIGNATURE_TOLERANCE_SECS;
use feeledger::gateways::services::{
    parse_stripe_event, verify_stripe_signature, CreatedIntent, GatewayEvent, GatewayIntent,
    IntentStatus, PaymentGateway,
};
use feeledger::ledger::models::GatewayProvider;

pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

/// One `create_intent` call as the gateway saw it
#[derive(Debug, Clone)]
pub struct RecordedIntent {
    pub id: String,
    pub amount_minor: i64,
    pub currency: Currency,
    pub metadata: HashMap<String, String>,
    pub idempotency_key: String,
}

#[derive(Default)]
pub struct ScriptedGateway {
    intents: Mutex<HashMap<String, GatewayIntent>>,
    created: Mutex<Vec<RecordedIntent>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&self) -> Vec<RecordedIntent> {
        self.created.lock().unwrap().clone()
    }

    /// Register an intent that `retrieve_intent` will report
    pub fn insert_intent(
        &self,
        id: &str,
        status: IntentStatus,
        amount_minor: i64,
        metadata: &[(&str, &str)],
    ) {
        let intent = GatewayIntent {
            id: id.to_string(),
            status,
            amount_minor,
            currency: Currency::INR,
            metadata: metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            last_error: None,
            raw_response: Some(format!("{{\"id\":\"{}\",\"status\":\"{}\"}}", id, status)),
        };
        self.intents.lock().unwrap().insert(id.to_string(), intent);
    }

    pub fn set_status(&self, id: &str, status: IntentStatus) {
        if let Some(intent) = self.intents.lock().unwrap().get_mut(id) {
            intent.status = status;
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: Currency,
        metadata: &HashMap<String, String>,
        idempotency_key: &str,
    ) -> Result<CreatedIntent> {
        let mut created = self.created.lock().unwrap();
        if let Some(existing) = created.iter().find(|c| c.idempotency_key == idempotency_key) {
            return Ok(CreatedIntent {
                id: existing.id.clone(),
                client_secret: format!("{}_secret", existing.id),
            });
        }

        let id = format!("pi_test_{}", created.len() + 1);
        created.push(RecordedIntent {
            id: id.clone(),
            amount_minor,
            currency,
            metadata: metadata.clone(),
            idempotency_key: idempotency_key.to_string(),
        });
        self.intents.lock().unwrap().insert(
            id.clone(),
            GatewayIntent {
                id: id.clone(),
                status: IntentStatus::RequiresPaymentMethod,
                amount_minor,
                currency,
                metadata: metadata.clone(),
                last_error: None,
                raw_response: None,
            },
        );

        Ok(CreatedIntent {
            client_secret: format!("{}_secret", id),
            id,
        })
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<GatewayIntent> {
        self.intents
            .lock()
            .unwrap()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| AppError::gateway(format!("No such payment_intent: {}", intent_id)))
    }

    fn verify_and_parse_event(
        &self,
        raw_body: &[u8],
        signature_header: &str,
        webhook_secret: &str,
    ) -> Result<GatewayEvent> {
        verify_stripe_signature(
            raw_body,
            signature_header,
            webhook_secret,
            Utc::now().timestamp(),
            SIGNATURE_TOLERANCE_SECS,
        )?;
        parse_stripe_event(raw_body)
    }

    fn name(&self) -> GatewayProvider {
        GatewayProvider::Stripe
    }
}

/// Stripe-shaped event body for a payment intent
pub fn intent_event_body(
    event_id: &str,
    event_type: &str,
    intent_id: &str,
    amount_minor: i64,
    metadata: &[(&str, &str)],
) -> Vec<u8> {
    let metadata: HashMap<&str, &str> = metadata.iter().copied().collect();
    let status = if event_type == "payment_intent.succeeded" {
        "succeeded"
    } else {
        "requires_payment_method"
    };
    let last_payment_error = if event_type == "payment_intent.payment_failed" {
        serde_json::json!({ "message": "Your card was declined." })
    } else {
        serde_json::Value::Null
    };

    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "data": {
            "object": {
                "id": intent_id,
                "object": "payment_intent",
                "status": status,
                "amount": amount_minor,
                "currency": "inr",
                "metadata": metadata,
                "last_payment_error": last_payment_error
            }
        }
    })
    .to_string()
    .into_bytes()
}

/// `Stripe-Signature` header for `body`, timestamped now
pub fn sign(body: &[u8], secret: &str) -> String {
    sign_at(body, secret, Utc::now().timestamp())
}

pub fn sign_at(body: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(body);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

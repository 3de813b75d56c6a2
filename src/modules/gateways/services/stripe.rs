use super::gateway_trait::{
    CreatedIntent, GatewayEvent, GatewayEventKind, GatewayIntent, PaymentGateway,
};
use crate::config::StripeConfig;
use crate::core::{AppError, Currency, Result};
use crate::modules::ledger::models::GatewayProvider;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed webhook
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

const PAYMENT_INTENT_EVENT_PREFIX: &str = "payment_intent.";

/// Stripe payment intents client
///
/// API Documentation: https://docs.stripe.com/api/payment_intents
pub struct StripeGateway {
    client: ClientWithMiddleware,
    secret_key: String,
    base_url: String,
}

impl StripeGateway {
    /// Create a new Stripe client
    ///
    /// # Arguments
    /// * `config` - Secret key, base URL, timeout and retry budget
    pub fn new(config: &StripeConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(config.max_retries);
        let client = ClientBuilder::new(http)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self {
            client,
            secret_key: config.secret_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn read_intent(response: reqwest::Response) -> Result<(StripeIntent, String)> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::gateway(format!("Failed to read Stripe response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<StripeErrorEnvelope>(&body)
                .ok()
                .and_then(|e| e.error.message)
                .unwrap_or_else(|| body.clone());
            return Err(AppError::gateway(format!(
                "Stripe returned {}: {}",
                status, message
            )));
        }

        let intent = serde_json::from_str::<StripeIntent>(&body)
            .map_err(|e| AppError::gateway(format!("Invalid Stripe intent payload: {}", e)))?;
        Ok((intent, body))
    }
}

fn send_error(err: reqwest_middleware::Error) -> AppError {
    match err {
        reqwest_middleware::Error::Reqwest(e) if e.is_timeout() => {
            AppError::gateway(format!("Stripe gateway unavailable: timeout ({})", e))
        }
        reqwest_middleware::Error::Reqwest(e) if e.is_connect() => {
            AppError::gateway(format!("Stripe gateway unavailable: connection failed ({})", e))
        }
        other => AppError::gateway(format!("Stripe API request failed: {}", other)),
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_intent(
        &self,
        amount_minor: i64,
        currency: Currency,
        metadata: &HashMap<String, String>,
        idempotency_key: &str,
    ) -> Result<CreatedIntent> {
        if amount_minor <= 0 {
            return Err(AppError::validation(format!(
                "Intent amount must be positive, got {}",
                amount_minor
            )));
        }

        let url = format!("{}/v1/payment_intents", self.base_url);
        let mut form: Vec<(String, String)> = vec![
            ("amount".to_string(), amount_minor.to_string()),
            ("currency".to_string(), currency.gateway_code()),
            (
                "automatic_payment_methods[enabled]".to_string(),
                "true".to_string(),
            ),
        ];
        let mut keys: Vec<&String> = metadata.keys().collect();
        keys.sort();
        for key in keys {
            form.push((format!("metadata[{}]", key), metadata[key].clone()));
        }

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.secret_key)
            .header("Idempotency-Key", idempotency_key)
            .form(&form)
            .send()
            .await
            .map_err(send_error)?;

        let (intent, _) = Self::read_intent(response).await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| AppError::gateway("Stripe intent is missing its client secret"))?;

        tracing::info!(
            gateway_payment_id = %intent.id,
            amount_minor,
            currency = %currency,
            "Created Stripe payment intent"
        );

        Ok(CreatedIntent {
            id: intent.id,
            client_secret,
        })
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<GatewayIntent> {
        let url = format!("{}/v1/payment_intents/{}", self.base_url, intent_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(send_error)?;

        let (intent, body) = Self::read_intent(response).await?;
        intent.into_gateway_intent(Some(body))
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
            chrono::Utc::now().timestamp(),
            SIGNATURE_TOLERANCE_SECS,
        )?;
        parse_stripe_event(raw_body)
    }

    fn name(&self) -> GatewayProvider {
        GatewayProvider::Stripe
    }
}

/// Verify a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=<hex>...]`).
///
/// The signed payload is `"{t}.{raw_body}"` under HMAC-SHA256. Any matching
/// `v1` entry is accepted; comparison is constant time.
pub fn verify_stripe_signature(
    raw_body: &[u8],
    signature_header: &str,
    webhook_secret: &str,
    now_unix: i64,
    tolerance_secs: i64,
) -> Result<()> {
    let mut timestamp: Option<i64> = None;
    let mut signatures: Vec<Vec<u8>> = Vec::new();

    for part in signature_header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Ok(bytes) = hex::decode(value) {
                    signatures.push(bytes);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        AppError::SignatureVerification("Signature header has no timestamp".to_string())
    })?;
    if signatures.is_empty() {
        return Err(AppError::SignatureVerification(
            "Signature header has no v1 signature".to_string(),
        ));
    }
    if (now_unix - timestamp).abs() > tolerance_secs {
        return Err(AppError::SignatureVerification(format!(
            "Signature timestamp {} is outside the {}s tolerance",
            timestamp, tolerance_secs
        )));
    }

    for signature in &signatures {
        let mut mac = HmacSha256::new_from_slice(webhook_secret.as_bytes())
            .map_err(|_| AppError::Configuration("Invalid webhook secret".to_string()))?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(raw_body);
        if mac.verify_slice(signature).is_ok() {
            return Ok(());
        }
    }

    Err(AppError::SignatureVerification(
        "No signature matches the payload".to_string(),
    ))
}

/// Parse a verified Stripe event body.
///
/// Only `payment_intent.*` events have their object decoded; every other
/// event type parses with no intent so it can be acknowledged.
pub fn parse_stripe_event(raw_body: &[u8]) -> Result<GatewayEvent> {
    let envelope: StripeEventEnvelope = serde_json::from_slice(raw_body)
        .map_err(|e| AppError::gateway(format!("Invalid Stripe event payload: {}", e)))?;

    let intent = if envelope.event_type.starts_with(PAYMENT_INTENT_EVENT_PREFIX) {
        let raw_object = envelope.data.object.to_string();
        let intent: StripeIntent = serde_json::from_value(envelope.data.object).map_err(|e| {
            AppError::gateway(format!("Event does not carry a payment intent: {}", e))
        })?;
        Some(intent.into_gateway_intent(Some(raw_object))?)
    } else {
        None
    };

    Ok(GatewayEvent {
        id: envelope.id,
        kind: GatewayEventKind::from_type(&envelope.event_type),
        intent,
    })
}

#[derive(Debug, Deserialize)]
struct StripeEventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct StripeIntent {
    id: String,
    status: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    client_secret: Option<String>,
    last_payment_error: Option<StripeErrorDetail>,
}

impl StripeIntent {
    fn into_gateway_intent(self, raw_response: Option<String>) -> Result<GatewayIntent> {
        Ok(GatewayIntent {
            status: self.status.parse()?,
            currency: self
                .currency
                .parse()
                .map_err(|_| AppError::gateway(format!("Unsupported currency: {}", self.currency)))?,
            id: self.id,
            amount_minor: self.amount,
            metadata: self.metadata,
            last_error: self.last_payment_error.and_then(|e| e.message),
            raw_response,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    message: Option<String>,
}

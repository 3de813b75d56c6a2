use actix_web::{web, HttpRequest, HttpResponse};
use std::sync::Arc;

use crate::core::{AppError, Result};
use crate::modules::reconciliation::services::ReconciliationService;

/// Header carrying the webhook signature
pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";

/// POST /webhooks/stripe
///
/// Verifies the signature over the raw body and applies the event.
///
/// # Returns
/// - 200: `{"received": true, "disposition": ...}`
/// - 400: Missing or invalid signature
/// - 404: No ledger record matches the event
/// - 502: Gateway error
///
/// Any non-2xx answer makes the gateway redeliver.
pub async fn stripe_webhook(
    req: HttpRequest,
    body: web::Bytes,
    service: web::Data<Arc<ReconciliationService>>,
) -> Result<HttpResponse> {
    let signature = req
        .headers()
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::SignatureVerification("Missing signature header".to_string()))?;

    let ack = service.handle_webhook(&body, signature).await?;
    Ok(HttpResponse::Ok().json(ack))
}

/// Configure webhook routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/webhooks/stripe", web::post().to(stripe_webhook));
}

use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::core::Result;
use crate::modules::gateways::services::IntentService;

/// POST /api/payments/{payment_id}/intent
///
/// Opens a gateway intent for the payment's outstanding balance.
///
/// # Returns
/// - 201: Intent id, client secret, amount and currency
/// - 400: Payment is completed, failed, refunded or has nothing outstanding
/// - 404: Payment not found
/// - 502: Gateway unavailable
pub async fn create_payment_intent(
    payment_id: web::Path<String>,
    service: web::Data<Arc<IntentService>>,
) -> Result<HttpResponse> {
    let intent = service.create_payment_intent(&payment_id).await?;
    Ok(HttpResponse::Created().json(intent))
}

/// POST /api/emi-payments/{emi_payment_id}/intent
///
/// Opens a gateway intent for a single installment.
pub async fn create_emi_payment_intent(
    emi_payment_id: web::Path<String>,
    service: web::Data<Arc<IntentService>>,
) -> Result<HttpResponse> {
    let intent = service.create_emi_payment_intent(&emi_payment_id).await?;
    Ok(HttpResponse::Created().json(intent))
}

/// Configure intent routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route(
        "/api/payments/{payment_id}/intent",
        web::post().to(create_payment_intent),
    )
    .route(
        "/api/emi-payments/{emi_payment_id}/intent",
        web::post().to(create_emi_payment_intent),
    );
}

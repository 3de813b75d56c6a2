use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::sync::Arc;

use crate::core::Result;
use crate::modules::ledger::models::PaymentStatus;
use crate::modules::reconciliation::models::ManualConfirmation;
use crate::modules::reconciliation::services::ReconciliationService;

#[derive(Debug, Deserialize)]
pub struct UpdatePaymentStatusRequest {
    pub status: PaymentStatus,
}

/// POST /api/payments/confirm
///
/// Applies an intent the gateway reports as succeeded.
///
/// # Request Body
/// ```json
/// {"payment_id": "...", "gateway_payment_id": "pi_...", "force_override": false}
/// ```
///
/// # Returns
/// - 200: Reconciliation outcome
/// - 400: Intent not succeeded, deposit lock, or both/neither ids given
/// - 404: Payment or installment not found
pub async fn confirm_payment(
    request: web::Json<ManualConfirmation>,
    service: web::Data<Arc<ReconciliationService>>,
) -> Result<HttpResponse> {
    let outcome = service.confirm_manually(&request).await?;
    Ok(HttpResponse::Ok().json(outcome))
}

/// POST /api/students/{student_id}/balance/recompute
pub async fn recompute_balance(
    student_id: web::Path<String>,
    service: web::Data<Arc<ReconciliationService>>,
) -> Result<HttpResponse> {
    let balance = service.recompute_student_balance(&student_id).await?;
    Ok(HttpResponse::Ok().json(balance))
}

/// PATCH /api/payments/{payment_id}/status
///
/// Only `failed` and `refunded` may be set explicitly.
pub async fn update_payment_status(
    payment_id: web::Path<String>,
    request: web::Json<UpdatePaymentStatusRequest>,
    service: web::Data<Arc<ReconciliationService>>,
) -> Result<HttpResponse> {
    let payment = service
        .update_payment_status(&payment_id, request.status)
        .await?;
    Ok(HttpResponse::Ok().json(payment))
}

/// DELETE /api/payments/{payment_id}
pub async fn delete_payment(
    payment_id: web::Path<String>,
    service: web::Data<Arc<ReconciliationService>>,
) -> Result<HttpResponse> {
    service.delete_payment(&payment_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /api/emi-payments/{emi_payment_id}/cancel
pub async fn cancel_emi_payment(
    emi_payment_id: web::Path<String>,
    service: web::Data<Arc<ReconciliationService>>,
) -> Result<HttpResponse> {
    let emi = service.cancel_emi_payment(&emi_payment_id).await?;
    Ok(HttpResponse::Ok().json(emi))
}

/// Configure confirmation and ledger admin routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/payments/confirm", web::post().to(confirm_payment))
        .route(
            "/api/payments/{payment_id}/status",
            web::patch().to(update_payment_status),
        )
        .route(
            "/api/payments/{payment_id}",
            web::delete().to(delete_payment),
        )
        .route(
            "/api/emi-payments/{emi_payment_id}/cancel",
            web::post().to(cancel_emi_payment),
        )
        .route(
            "/api/students/{student_id}/balance/recompute",
            web::post().to(recompute_balance),
        );
}

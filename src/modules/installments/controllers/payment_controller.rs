use actix_web::{web, HttpResponse};
use std::sync::Arc;

use crate::core::Result;
use crate::modules::installments::models::CreatePaymentRequest;
use crate::modules::installments::services::PaymentPlanner;

/// POST /api/payments
///
/// Registers a fee obligation with an optional installment plan.
///
/// # Request Body
/// ```json
/// {
///   "student_id": "stu-1",
///   "course_name": "Foundation",
///   "total_amount": "10000",
///   "deposit_amount": "3000",
///   "due_date": "2030-01-05",
///   "installment_count": 3
/// }
/// ```
///
/// # Returns
/// - 201: Payment created with its installments
/// - 400: Invalid amounts, installment count or missing due date
/// - 404: Student not found
pub async fn create_payment(
    request: web::Json<CreatePaymentRequest>,
    planner: web::Data<Arc<PaymentPlanner>>,
) -> Result<HttpResponse> {
    let planned = planner.create_payment(request.into_inner()).await?;
    Ok(HttpResponse::Created().json(planned))
}

/// Configure payment planning routes
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/payments", web::post().to(create_payment));
}

// Test data factory
//
// Unique ids keep tests that share a store isolated.

use chrono::{NaiveDate, Utc};
use feeledger::core::Currency;
use feeledger::installments::CreatePaymentRequest;
use feeledger::ledger::models::{GatewayProvider, PaymentMethod, Student};
use feeledger::reconciliation::models::{EventMetadata, PaymentEvent};
use rust_decimal::Decimal;
use uuid::Uuid;

pub struct TestDataFactory;

impl TestDataFactory {
    /// Student id in the format "TEST-{uuid}"
    pub fn random_student_id() -> String {
        format!("TEST-{}", Uuid::new_v4())
    }

    pub fn student(id: &str) -> Student {
        Student::new(id, "Test Student", Utc::now())
    }

    /// First due date used by every generated plan
    pub fn first_due_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 1, 5).expect("valid date")
    }

    /// Payment request with an equal-split plan when `installment_count` is set
    pub fn payment_request(
        student_id: &str,
        total_amount: Decimal,
        deposit_amount: Decimal,
        installment_count: Option<i32>,
    ) -> CreatePaymentRequest {
        CreatePaymentRequest {
            student_id: student_id.to_string(),
            course_name: "Foundation Programme".to_string(),
            total_amount,
            deposit_amount,
            currency: Some(Currency::INR),
            payment_method: PaymentMethod::Cash,
            due_date: Some(Self::first_due_date()),
            installment_count,
            installments: Vec::new(),
            notes: None,
        }
    }
}

/// Success event as the gateway adapter would produce it
pub fn success_event(gateway_payment_id: &str, amount: Decimal, metadata: EventMetadata) -> PaymentEvent {
    PaymentEvent {
        gateway_payment_id: gateway_payment_id.to_string(),
        amount,
        currency: Currency::INR,
        provider: GatewayProvider::Stripe,
        metadata,
        gateway_response: Some(format!("{{\"id\":\"{}\",\"status\":\"succeeded\"}}", gateway_payment_id)),
        failure_message: None,
    }
}

/// Failure event carrying only a decline message
pub fn failure_event(gateway_payment_id: &str, metadata: EventMetadata) -> PaymentEvent {
    PaymentEvent {
        gateway_payment_id: gateway_payment_id.to_string(),
        amount: Decimal::ZERO,
        currency: Currency::INR,
        provider: GatewayProvider::Stripe,
        metadata,
        gateway_response: None,
        failure_message: Some("Your card was declined.".to_string()),
    }
}

pub fn payment_metadata(payment_id: &str, student_id: &str) -> EventMetadata {
    EventMetadata {
        payment_id: Some(payment_id.to_string()),
        emi_payment_id: None,
        student_id: Some(student_id.to_string()),
    }
}

pub fn emi_metadata(emi_payment_id: &str, payment_id: &str, student_id: &str) -> EventMetadata {
    EventMetadata {
        payment_id: Some(payment_id.to_string()),
        emi_payment_id: Some(emi_payment_id.to_string()),
        student_id: Some(student_id.to_string()),
    }
}

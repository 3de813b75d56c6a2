// Gateway intents for outstanding payments and single installments

#[path = "../helpers/mod.rs"]
mod helpers;

use actix_web::{test, App};
use feeledger::core::{AppError, Currency};
use feeledger::ledger::models::{EmiStatus, GatewayProvider, PaymentStatus};
use feeledger::ledger::LedgerStore;
use helpers::*;
use rust_decimal_macros::dec;
use serde_json::Value;

#[tokio::test]
async fn test_payment_intent_charges_outstanding_amount() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let payment_id = planned.payment.id.clone();

    let intent = ctx
        .state
        .intents
        .create_payment_intent(&payment_id)
        .await
        .expect("Failed to create intent");

    assert_eq!(intent.intent_id, "pi_test_1");
    assert_eq!(intent.amount, dec!(6000));
    assert_eq!(intent.currency, Currency::INR);

    let calls = ctx.gateway.created();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].amount_minor, 600_000);
    assert_eq!(calls[0].metadata.get("paymentId"), Some(&payment_id));
    assert_eq!(calls[0].metadata.get("studentId"), Some(&student_id));
    assert_eq!(calls[0].idempotency_key, format!("payment:{}:600000", payment_id));

    let payment = ctx.store.find_payment(&payment_id).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Processing);
    assert_eq!(payment.gateway_payment_id.as_deref(), Some("pi_test_1"));
    assert_eq!(payment.gateway_provider, Some(GatewayProvider::Stripe));
}

#[tokio::test]
async fn test_repeated_payment_intent_reuses_idempotency_key() {
    let ctx = TestContext::new();
    let (_, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;

    let first = ctx
        .state
        .intents
        .create_payment_intent(&planned.payment.id)
        .await
        .unwrap();
    let second = ctx
        .state
        .intents
        .create_payment_intent(&planned.payment.id)
        .await
        .unwrap();

    assert_eq!(first.intent_id, second.intent_id);
    assert_eq!(ctx.gateway.created().len(), 1);
}

#[tokio::test]
async fn test_settled_payment_cannot_be_charged() {
    let ctx = TestContext::new();
    let (_, planned) = ctx.student_with_plan(dec!(5000), dec!(5000), None).await;

    let err = ctx
        .state
        .intents
        .create_payment_intent(&planned.payment.id)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::InvalidState { .. }));
    assert!(ctx.gateway.created().is_empty());
}

#[tokio::test]
async fn test_payment_intent_then_webhook_completes_payment() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let intent = ctx
        .state
        .intents
        .create_payment_intent(&planned.payment.id)
        .await
        .unwrap();

    let body = intent_event_body(
        "evt_intent",
        "payment_intent.succeeded",
        &intent.intent_id,
        600_000,
        &[],
    );
    ctx.state
        .reconciliation
        .handle_webhook(&body, &sign(&body, WEBHOOK_SECRET))
        .await
        .unwrap();

    let ledger = ctx.store.load_ledger(&student_id).await.unwrap();
    assert_eq!(
        ledger.payment(&planned.payment.id).unwrap().status,
        PaymentStatus::Completed
    );
    assert!(ledger.emi_payments.iter().all(|e| e.status == EmiStatus::Paid));
    assert_eq!(ledger.student.paid_amount, dec!(9000));
}

#[tokio::test]
async fn test_balance_equal_to_deposit_is_collected_in_full() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(6000), dec!(3000), Some(1)).await;
    let intent = ctx
        .state
        .intents
        .create_payment_intent(&planned.payment.id)
        .await
        .unwrap();
    assert_eq!(intent.amount, dec!(3000));

    let body = intent_event_body(
        "evt_half",
        "payment_intent.succeeded",
        &intent.intent_id,
        300_000,
        &[],
    );
    let ack = ctx
        .state
        .reconciliation
        .handle_webhook(&body, &sign(&body, WEBHOOK_SECRET))
        .await
        .unwrap();
    assert!(ack.received);

    let ledger = ctx.store.load_ledger(&student_id).await.unwrap();
    assert_eq!(
        ledger.payment(&planned.payment.id).unwrap().status,
        PaymentStatus::Completed
    );
    assert_eq!(ledger.emi_payments[0].status, EmiStatus::Paid);
    assert_eq!(ledger.student.paid_amount, dec!(6000));
    assert_eq!(ledger.student.remaining_amount, dec!(0));
}

#[tokio::test]
async fn test_installment_intent_marks_processing() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let emi = planned.installments[0].clone();

    let intent = ctx
        .state
        .intents
        .create_emi_payment_intent(&emi.id)
        .await
        .unwrap();
    assert_eq!(intent.amount, dec!(2000));

    let calls = ctx.gateway.created();
    assert_eq!(calls[0].amount_minor, 200_000);
    assert_eq!(calls[0].metadata.get("emiPaymentId"), Some(&emi.id));
    assert_eq!(calls[0].metadata.get("paymentId"), Some(&planned.payment.id));
    assert_eq!(calls[0].metadata.get("studentId"), Some(&student_id));

    let stored = ctx.store.find_emi_payment(&emi.id).await.unwrap().unwrap();
    assert_eq!(stored.status, EmiStatus::Processing);
    assert_eq!(stored.gateway_payment_id.as_deref(), Some(intent.intent_id.as_str()));
    assert!(!stored.has_settlement_evidence());

    let student = ctx.store.find_student(&student_id).await.unwrap().unwrap();
    assert_eq!(student.paid_amount, dec!(3000));
}

#[tokio::test]
async fn test_paid_installment_cannot_be_charged() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let emi = planned.installments[0].clone();
    ctx.state
        .reconciliation
        .apply_success(
            &success_event(
                "pi_done",
                emi.amount,
                emi_metadata(&emi.id, &planned.payment.id, &student_id),
            ),
            false,
        )
        .await
        .unwrap();

    let err = ctx
        .state
        .intents
        .create_emi_payment_intent(&emi.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState { .. }));
}

#[actix_web::test]
async fn test_intent_routes() {
    let ctx = TestContext::new();
    let (_, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let app = test::init_service(App::new().configure(|cfg| ctx.state.configure(cfg))).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/emi-payments/{}/intent", planned.installments[0].id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["intent_id"], "pi_test_1");
    assert_eq!(body["client_secret"], "pi_test_1_secret");

    let req = test::TestRequest::post()
        .uri("/api/payments/no-such-payment/intent")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

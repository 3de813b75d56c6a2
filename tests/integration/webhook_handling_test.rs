// Stripe webhook endpoint: signature checks, event dispatch and the
// status codes that drive gateway redelivery.

#[path = "../helpers/mod.rs"]
mod helpers;

use actix_web::{test, App};
use chrono::Utc;
use feeledger::ledger::models::{EmiStatus, PaymentStatus};
use feeledger::ledger::LedgerStore;
use helpers::*;
use rust_decimal_macros::dec;
use serde_json::Value;

const SUCCEEDED: &str = "payment_intent.succeeded";
const FAILED: &str = "payment_intent.payment_failed";

fn webhook_request(body: Vec<u8>, signature: &str) -> test::TestRequest {
    test::TestRequest::post()
        .uri("/webhooks/stripe")
        .insert_header(("Stripe-Signature", signature.to_string()))
        .insert_header(("Content-Type", "application/json"))
        .set_payload(body)
}

#[actix_web::test]
async fn test_signed_deposit_event_is_applied() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let payment_id = planned.payment.id.clone();
    let app = test::init_service(App::new().configure(|cfg| ctx.state.configure(cfg))).await;

    let body = intent_event_body(
        "evt_1",
        SUCCEEDED,
        "pi_hook_1",
        300_000,
        &[("paymentId", payment_id.as_str()), ("studentId", student_id.as_str())],
    );
    let signature = sign(&body, WEBHOOK_SECRET);
    let resp = test::call_service(&app, webhook_request(body, &signature).to_request()).await;

    assert_eq!(resp.status(), 200);
    let ack: Value = test::read_body_json(resp).await;
    assert_eq!(ack["received"], true);
    assert_eq!(ack["disposition"], "applied");
    assert_eq!(ack["outcome"]["classification"], "deposit_only");

    let ledger = ctx.store.load_ledger(&student_id).await.unwrap();
    let payment = ledger.payment(&payment_id).unwrap();
    assert_eq!(payment.status, PaymentStatus::Partial);
    assert_eq!(payment.gateway_payment_id.as_deref(), Some("pi_hook_1"));
    assert!(payment
        .gateway_response
        .as_deref()
        .is_some_and(|raw| raw.contains("pi_hook_1")));
    assert_eq!(ledger.student.paid_amount, dec!(3000));
}

#[actix_web::test]
async fn test_installment_event_converts_minor_units() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let emi = planned.installments[0].clone();
    let app = test::init_service(App::new().configure(|cfg| ctx.state.configure(cfg))).await;

    let body = intent_event_body(
        "evt_2",
        SUCCEEDED,
        "pi_hook_emi",
        200_000,
        &[
            ("emiPaymentId", emi.id.as_str()),
            ("paymentId", planned.payment.id.as_str()),
            ("studentId", student_id.as_str()),
        ],
    );
    let signature = sign(&body, WEBHOOK_SECRET);
    let resp = test::call_service(&app, webhook_request(body, &signature).to_request()).await;
    assert_eq!(resp.status(), 200);

    let ledger = ctx.store.load_ledger(&student_id).await.unwrap();
    assert_eq!(ledger.emi(&emi.id).unwrap().status, EmiStatus::Paid);
    assert_eq!(ledger.student.paid_amount, dec!(5000));
}

#[actix_web::test]
async fn test_bad_signature_is_rejected_without_writes() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let before = ctx.store.load_ledger(&student_id).await.unwrap();
    let app = test::init_service(App::new().configure(|cfg| ctx.state.configure(cfg))).await;

    let body = intent_event_body(
        "evt_3",
        SUCCEEDED,
        "pi_forged",
        900_000,
        &[("paymentId", planned.payment.id.as_str())],
    );
    let signature = sign(&body, "whsec_someone_else");
    let resp = test::call_service(&app, webhook_request(body, &signature).to_request()).await;

    assert_eq!(resp.status(), 400);
    let error: Value = test::read_body_json(resp).await;
    assert_eq!(error["error"]["kind"], "gateway");
    assert_eq!(ctx.store.load_ledger(&student_id).await.unwrap(), before);
}

#[actix_web::test]
async fn test_stale_signature_is_rejected() {
    let ctx = TestContext::new();
    let (_, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let app = test::init_service(App::new().configure(|cfg| ctx.state.configure(cfg))).await;

    let body = intent_event_body(
        "evt_4",
        SUCCEEDED,
        "pi_old",
        300_000,
        &[("paymentId", planned.payment.id.as_str())],
    );
    let signature = sign_at(&body, WEBHOOK_SECRET, Utc::now().timestamp() - 3600);
    let resp = test::call_service(&app, webhook_request(body, &signature).to_request()).await;

    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_missing_signature_header_is_rejected() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| ctx.state.configure(cfg))).await;

    let req = test::TestRequest::post()
        .uri("/webhooks/stripe")
        .set_payload(intent_event_body("evt_5", SUCCEEDED, "pi_x", 100, &[]))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_other_event_types_are_acknowledged_and_ignored() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| ctx.state.configure(cfg))).await;

    let body = intent_event_body("evt_6", "payment_intent.created", "pi_new", 100, &[]);
    let signature = sign(&body, WEBHOOK_SECRET);
    let resp = test::call_service(&app, webhook_request(body, &signature).to_request()).await;

    assert_eq!(resp.status(), 200);
    let ack: Value = test::read_body_json(resp).await;
    assert_eq!(ack["disposition"], "ignored");
    assert!(ack["outcome"].is_null());
}

#[actix_web::test]
async fn test_non_intent_events_are_acknowledged() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| ctx.state.configure(cfg))).await;

    for (event_id, event_type, object) in [
        (
            "evt_cus",
            "customer.created",
            serde_json::json!({ "id": "cus_1", "object": "customer", "email": "parent@example.test" }),
        ),
        (
            "evt_ch",
            "charge.refunded",
            serde_json::json!({ "id": "ch_1", "object": "charge", "amount_refunded": 300000 }),
        ),
    ] {
        let body = serde_json::json!({
            "id": event_id,
            "type": event_type,
            "data": { "object": object }
        })
        .to_string()
        .into_bytes();
        let signature = sign(&body, WEBHOOK_SECRET);
        let resp = test::call_service(&app, webhook_request(body, &signature).to_request()).await;

        assert_eq!(resp.status(), 200, "{} should be acknowledged", event_type);
        let ack: Value = test::read_body_json(resp).await;
        assert_eq!(ack["received"], true);
        assert_eq!(ack["disposition"], "ignored");
    }
}

#[actix_web::test]
async fn test_failure_event_records_gateway_payload() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let payment_id = planned.payment.id.clone();
    let app = test::init_service(App::new().configure(|cfg| ctx.state.configure(cfg))).await;

    let body = intent_event_body(
        "evt_7",
        FAILED,
        "pi_declined",
        300_000,
        &[("paymentId", payment_id.as_str())],
    );
    let signature = sign(&body, WEBHOOK_SECRET);
    let resp = test::call_service(&app, webhook_request(body, &signature).to_request()).await;

    assert_eq!(resp.status(), 200);
    let ack: Value = test::read_body_json(resp).await;
    assert_eq!(ack["disposition"], "failure_recorded");

    let ledger = ctx.store.load_ledger(&student_id).await.unwrap();
    let payment = ledger.payment(&payment_id).unwrap();
    assert_eq!(payment.status, PaymentStatus::Partial);
    assert!(payment
        .gateway_response
        .as_deref()
        .is_some_and(|raw| raw.contains("Your card was declined.")));
    assert_eq!(ledger.student.paid_amount, dec!(3000));
}

#[actix_web::test]
async fn test_unresolvable_event_asks_for_redelivery() {
    let ctx = TestContext::new();
    let app = test::init_service(App::new().configure(|cfg| ctx.state.configure(cfg))).await;

    let body = intent_event_body(
        "evt_8",
        SUCCEEDED,
        "pi_orphan",
        100_000,
        &[("paymentId", "no-such-payment")],
    );
    let signature = sign(&body, WEBHOOK_SECRET);
    let resp = test::call_service(&app, webhook_request(body, &signature).to_request()).await;

    assert_eq!(resp.status(), 404);
    let error: Value = test::read_body_json(resp).await;
    assert!(error["error"]["context"]["attempted"]
        .as_str()
        .unwrap()
        .contains("paymentId=no-such-payment"));
}

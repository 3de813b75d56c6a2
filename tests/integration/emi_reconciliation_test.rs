// Installment settlement: completion rollup, settlement evidence,
// replays and the deposit lock.

#[path = "../helpers/mod.rs"]
mod helpers;

use feeledger::core::AppError;
use feeledger::ledger::models::{EmiStatus, EnrollmentStatus, FeeStatus, PaymentStatus};
use feeledger::ledger::{LedgerStore, SequenceGenerator};
use feeledger::reconciliation::models::{EventMetadata, ReconciliationTarget};
use feeledger::reconciliation::Disposition;
use helpers::*;
use rust_decimal_macros::dec;

#[tokio::test]
async fn test_last_installment_completes_payment() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let payment_id = planned.payment.id.clone();

    for (i, emi) in planned.installments.iter().enumerate() {
        ctx.state
            .reconciliation
            .apply_success(
                &success_event(
                    &format!("pi_emi_{}", i + 1),
                    emi.amount,
                    emi_metadata(&emi.id, &payment_id, &student_id),
                ),
                false,
            )
            .await
            .expect("Failed to settle installment");

        let ledger = ctx.store.load_ledger(&student_id).await.unwrap();
        let payment = ledger.payment(&payment_id).unwrap();
        if i + 1 < planned.installments.len() {
            assert_eq!(payment.status, PaymentStatus::Partial);
            assert_eq!(ledger.student.fee_status, FeeStatus::Partial);
            assert_eq!(
                ledger.student.next_payment_due,
                Some(planned.installments[i + 1].due_date)
            );
        }
    }

    let ledger = ctx.store.load_ledger(&student_id).await.unwrap();
    assert_eq!(
        ledger.payment(&payment_id).unwrap().status,
        PaymentStatus::Completed
    );
    assert_eq!(ledger.student.paid_amount, dec!(9000));
    assert_eq!(ledger.student.remaining_amount, dec!(0));
    assert_eq!(ledger.student.fee_status, FeeStatus::Complete);
    assert_eq!(ledger.student.status, EnrollmentStatus::Active);
    assert_eq!(ledger.student.next_payment_due, None);
}

#[tokio::test]
async fn test_settled_installment_carries_full_evidence() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let emi = planned.installments[0].clone();

    let outcome = ctx
        .state
        .reconciliation
        .apply_success(
            &success_event(
                "pi_emi_1",
                emi.amount,
                emi_metadata(&emi.id, &planned.payment.id, &student_id),
            ),
            false,
        )
        .await
        .unwrap();

    assert_eq!(outcome.disposition, Disposition::Applied);
    assert_eq!(
        outcome.target,
        ReconciliationTarget::EmiPayment {
            emi_payment_id: emi.id.clone(),
            payment_id: planned.payment.id.clone(),
        }
    );

    let settled = ctx.store.find_emi_payment(&emi.id).await.unwrap().unwrap();
    assert_eq!(settled.status, EmiStatus::Paid);
    assert!(settled.paid_date.is_some());
    assert_eq!(settled.transaction_id.as_deref(), Some("pi_emi_1"));
    assert_eq!(settled.gateway_payment_id.as_deref(), Some("pi_emi_1"));
    assert_eq!(settled.receipt_number.as_deref(), Some("EMI000001"));
}

#[tokio::test]
async fn test_paid_installment_without_evidence_is_rejected_by_store() {
    let ctx = TestContext::new();
    let (student_id, _) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;

    let mut ledger = ctx.store.load_ledger(&student_id).await.unwrap();
    ledger.emi_payments[0].status = EmiStatus::Paid;
    ctx.store.seed_ledger(ledger).await;

    let err = ctx
        .state
        .reconciliation
        .recompute_student_balance(&student_id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Consistency(_)));
}

#[tokio::test]
async fn test_replayed_installment_event_issues_one_receipt() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let emi = planned.installments[0].clone();
    let event = success_event(
        "pi_emi_1",
        emi.amount,
        emi_metadata(&emi.id, &planned.payment.id, &student_id),
    );

    ctx.state.reconciliation.apply_success(&event, false).await.unwrap();
    let first = ctx.store.load_ledger(&student_id).await.unwrap();
    let replay = ctx.state.reconciliation.apply_success(&event, false).await.unwrap();
    let second = ctx.store.load_ledger(&student_id).await.unwrap();

    assert_eq!(replay.disposition, Disposition::Duplicate);
    assert_eq!(first, second);
    assert_eq!(second.student.paid_amount, dec!(5000));
    assert_eq!(ctx.store.next("EMI").await.unwrap(), "EMI000002");
}

#[tokio::test]
async fn test_installment_paid_by_other_intent_rejects_new_one() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let emi = planned.installments[0].clone();
    let metadata = emi_metadata(&emi.id, &planned.payment.id, &student_id);

    ctx.state
        .reconciliation
        .apply_success(&success_event("pi_first", emi.amount, metadata.clone()), false)
        .await
        .unwrap();

    let err = ctx
        .state
        .reconciliation
        .apply_success(&success_event("pi_second", emi.amount, metadata), false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState { .. }));

    let ledger = ctx.store.load_ledger(&student_id).await.unwrap();
    assert_eq!(ledger.student.paid_amount, dec!(5000));
}

#[tokio::test]
async fn test_cancelled_installment_rejects_settlement() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let emi = planned.installments[2].clone();

    ctx.state.reconciliation.cancel_emi_payment(&emi.id).await.unwrap();

    let err = ctx
        .state
        .reconciliation
        .apply_success(
            &success_event(
                "pi_late",
                emi.amount,
                emi_metadata(&emi.id, &planned.payment.id, &student_id),
            ),
            false,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState { .. }));
}

#[tokio::test]
async fn test_deposit_lock_requires_override() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let payment_id = planned.payment.id.clone();
    let emi = planned.installments[0].clone();

    ctx.state
        .intents
        .create_payment_intent(&payment_id)
        .await
        .expect("Failed to create payment intent");

    let event = success_event(
        "pi_emi_1",
        emi.amount,
        emi_metadata(&emi.id, &payment_id, &student_id),
    );
    let err = ctx
        .state
        .reconciliation
        .apply_success(&event, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState { .. }));
    assert_eq!(
        ctx.store.find_emi_payment(&emi.id).await.unwrap().unwrap().status,
        EmiStatus::Pending
    );

    let outcome = ctx
        .state
        .reconciliation
        .apply_success(&event, true)
        .await
        .unwrap();
    assert_eq!(outcome.disposition, Disposition::Applied);
    assert_eq!(
        ctx.store.find_emi_payment(&emi.id).await.unwrap().unwrap().status,
        EmiStatus::Paid
    );
}

#[tokio::test]
async fn test_installment_resolved_by_gateway_id() {
    let ctx = TestContext::new();
    let (_, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let emi = planned.installments[1].clone();

    let intent = ctx
        .state
        .intents
        .create_emi_payment_intent(&emi.id)
        .await
        .unwrap();

    let outcome = ctx
        .state
        .reconciliation
        .apply_success(
            &success_event(&intent.intent_id, emi.amount, EventMetadata::default()),
            false,
        )
        .await
        .unwrap();

    assert_eq!(
        outcome.target,
        ReconciliationTarget::EmiPayment {
            emi_payment_id: emi.id.clone(),
            payment_id: planned.payment.id.clone(),
        }
    );
}

#[tokio::test]
async fn test_unknown_installment_falls_back_to_earliest_open() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;

    let metadata = EventMetadata {
        emi_payment_id: Some("missing-emi".to_string()),
        student_id: Some(student_id.clone()),
        ..EventMetadata::default()
    };
    let outcome = ctx
        .state
        .reconciliation
        .apply_success(&success_event("pi_orphan", dec!(2000), metadata), false)
        .await
        .unwrap();

    let first = &planned.installments[0];
    assert_eq!(
        outcome.target,
        ReconciliationTarget::EmiPayment {
            emi_payment_id: first.id.clone(),
            payment_id: planned.payment.id.clone(),
        }
    );
}

#[tokio::test]
async fn test_failure_event_records_diagnostics_only() {
    let ctx = TestContext::new();
    let (student_id, planned) = ctx.student_with_plan(dec!(9000), dec!(3000), Some(3)).await;
    let emi = planned.installments[0].clone();
    let before = ctx.store.load_ledger(&student_id).await.unwrap();

    let outcome = ctx
        .state
        .reconciliation
        .apply_failure(&failure_event(
            "pi_declined",
            emi_metadata(&emi.id, &planned.payment.id, &student_id),
        ))
        .await
        .unwrap();
    assert_eq!(outcome.disposition, Disposition::FailureRecorded);

    let after = ctx.store.load_ledger(&student_id).await.unwrap();
    let failed = after.emi(&emi.id).unwrap();
    assert_eq!(failed.status, EmiStatus::Pending);
    assert_eq!(failed.gateway_response.as_deref(), Some("Your card was declined."));
    assert_eq!(after.student, before.student);
    assert_eq!(after.payments, before.payments);
}

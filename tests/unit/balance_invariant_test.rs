// Student balance invariant under arbitrary event sequences.
//
// paid_amount must always equal the deposits of non-failed payments plus
// every paid installment, and remaining_amount = total_fees - paid_amount.

use chrono::{NaiveDate, Utc};
use feeledger::core::Currency;
use feeledger::ledger::models::{
    EmiPayment, EmiStatus, GatewayProvider, Payment, PaymentStatus, Student, StudentLedger,
};
use feeledger::reconciliation::models::{EventMetadata, PaymentEvent, ReconciliationTarget};
use feeledger::reconciliation::{BalanceAggregator, Disposition, ReconciliationEngine};
use proptest::prelude::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

#[derive(Debug, Clone)]
enum Op {
    SettleEmi { emi: usize, intent: u8 },
    PayDeposit { payment: usize, intent: u8 },
    PayFull { payment: usize, intent: u8 },
    PayOdd { payment: usize, minor: i64 },
    RecordFailure { payment: usize },
    FailPayment { payment: usize },
    CancelEmi { emi: usize },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..5, 0u8..3).prop_map(|(emi, intent)| Op::SettleEmi { emi, intent }),
        2 => (0usize..2, 0u8..3).prop_map(|(payment, intent)| Op::PayDeposit { payment, intent }),
        1 => (0usize..2, 0u8..3).prop_map(|(payment, intent)| Op::PayFull { payment, intent }),
        1 => (0usize..2, 1i64..200_000).prop_map(|(payment, minor)| Op::PayOdd { payment, minor }),
        1 => (0usize..2).prop_map(|payment| Op::RecordFailure { payment }),
        1 => (0usize..2).prop_map(|payment| Op::FailPayment { payment }),
        1 => (0usize..5).prop_map(|emi| Op::CancelEmi { emi }),
    ]
}

/// Two payments: 10000 with a 3000 deposit over three installments and
/// 5000 with no deposit over two.
fn seeded_ledger() -> StudentLedger {
    let now = Utc::now();
    let student = Student::new("stu-prop", "Meera", now).with_total_fees(dec!(15000));
    let mut ledger = StudentLedger::new(student, Vec::new(), Vec::new());

    let plans = vec![
        (dec!(10000), dec!(3000), vec![dec!(2333.33), dec!(2333.33), dec!(2333.34)]),
        (dec!(5000), dec!(0), vec![dec!(2500), dec!(2500)]),
    ];

    for (total, deposit, installments) in plans {
        let mut payment = Payment::new(
            "stu-prop".to_string(),
            "Foundation".to_string(),
            total,
            deposit,
            installments.len() as i32,
            Currency::INR,
            now,
        )
        .unwrap();
        payment.due_date = NaiveDate::from_ymd_opt(2030, 1, 5);
        let emis = installments
            .iter()
            .enumerate()
            .map(|(i, amount)| {
                EmiPayment::new(
                    payment.id.clone(),
                    "stu-prop".to_string(),
                    i as i32 + 1,
                    *amount,
                    NaiveDate::from_ymd_opt(2030, 1 + i as u32, 5).unwrap(),
                    now,
                )
                .unwrap()
            })
            .collect();
        ledger.add_payment(payment, emis);
    }

    BalanceAggregator::apply(&mut ledger, now);
    ledger
}

fn event(gateway_payment_id: String, amount: Decimal) -> PaymentEvent {
    PaymentEvent {
        gateway_payment_id,
        amount,
        currency: Currency::INR,
        provider: GatewayProvider::Stripe,
        metadata: EventMetadata::default(),
        gateway_response: None,
        failure_message: None,
    }
}

fn apply(ledger: &mut StudentLedger, op: &Op) -> feeledger::core::Result<()> {
    let now = Utc::now();
    match op {
        Op::SettleEmi { emi, intent } => {
            let target = ledger.emi_payments[*emi].clone();
            let event = event(format!("pi_emi_{}_{}", emi, intent), target.amount);
            ReconciliationEngine::apply_emi_success(ledger, &target.id, &event, false, now)?;
        }
        Op::PayDeposit { payment, intent } => {
            let target = ledger.payments[*payment].clone();
            let event = event(format!("pi_dep_{}_{}", payment, intent), target.deposit_amount);
            ReconciliationEngine::apply_payment_success(ledger, &target.id, &event, now)?;
        }
        Op::PayFull { payment, intent } => {
            let target = ledger.payments[*payment].clone();
            let event = event(format!("pi_full_{}_{}", payment, intent), target.total_amount);
            ReconciliationEngine::apply_payment_success(ledger, &target.id, &event, now)?;
        }
        Op::PayOdd { payment, minor } => {
            let target = ledger.payments[*payment].clone();
            let event = event(format!("pi_odd_{}_{}", payment, minor), Decimal::new(*minor, 2));
            ReconciliationEngine::apply_payment_success(ledger, &target.id, &event, now)?;
        }
        Op::RecordFailure { payment } => {
            let target = ReconciliationTarget::Payment {
                payment_id: ledger.payments[*payment].id.clone(),
            };
            let mut event = event("pi_declined".to_string(), Decimal::ZERO);
            event.failure_message = Some("card_declined".to_string());
            ReconciliationEngine::apply_failure(ledger, &target, &event, now)?;
        }
        Op::FailPayment { payment } => {
            let payment_id = ledger.payments[*payment].id.clone();
            ledger
                .require_payment_mut(&payment_id)?
                .set_status(PaymentStatus::Failed, now);
            BalanceAggregator::apply(ledger, now);
        }
        Op::CancelEmi { emi } => {
            let target = ledger.emi_payments[*emi].clone();
            ledger.require_emi_mut(&target.id)?.cancel(now)?;
            ReconciliationEngine::rollup_payment_status(ledger, &target.payment_id, now)?;
            BalanceAggregator::apply(ledger, now);
        }
    }
    Ok(())
}

fn expected_paid(ledger: &StudentLedger) -> Decimal {
    let deposits: Decimal = ledger
        .payments
        .iter()
        .filter(|p| p.status != PaymentStatus::Failed)
        .map(|p| p.deposit_amount)
        .sum();
    let installments: Decimal = ledger
        .emi_payments
        .iter()
        .filter(|e| e.status == EmiStatus::Paid)
        .map(|e| e.amount)
        .sum();
    deposits + installments
}

#[test]
fn test_seeded_ledger_counts_deposit_only() {
    let ledger = seeded_ledger();
    assert_eq!(ledger.student.paid_amount, dec!(3000));
    assert_eq!(ledger.student.remaining_amount, dec!(12000));
    assert!(ledger.check_invariants().is_ok());
}

#[test]
fn test_failed_payment_deposit_leaves_balance() {
    let mut ledger = seeded_ledger();
    apply(&mut ledger, &Op::FailPayment { payment: 0 }).unwrap();

    assert_eq!(ledger.student.paid_amount, dec!(0));
    assert_eq!(ledger.student.remaining_amount, dec!(15000));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    /// Accepted operations always leave the balance equal to the from-scratch sum
    #[test]
    fn prop_balance_matches_aggregate(ops in prop::collection::vec(op_strategy(), 1..25)) {
        let mut ledger = seeded_ledger();

        for op in &ops {
            let mut candidate = ledger.clone();
            if apply(&mut candidate, op).is_ok() {
                ledger = candidate;
            }

            prop_assert_eq!(ledger.student.paid_amount, expected_paid(&ledger));
            prop_assert_eq!(
                ledger.student.remaining_amount,
                ledger.student.total_fees - ledger.student.paid_amount
            );
            prop_assert!(ledger.check_invariants().is_ok(), "{:?}", ledger.check_invariants());
        }
    }

    /// Replaying an accepted success event changes nothing
    #[test]
    fn prop_replayed_success_is_duplicate(
        ops in prop::collection::vec(op_strategy(), 0..10),
        emi in 0usize..5,
    ) {
        let mut ledger = seeded_ledger();
        for op in &ops {
            let mut candidate = ledger.clone();
            if apply(&mut candidate, op).is_ok() {
                ledger = candidate;
            }
        }

        let target = ledger.emi_payments[emi].clone();
        let event = event(format!("pi_replay_{}", emi), target.amount);
        let mut first = ledger.clone();
        if ReconciliationEngine::apply_emi_success(&mut first, &target.id, &event, false, Utc::now()).is_ok() {
            let mut second = first.clone();
            let outcome = ReconciliationEngine::apply_emi_success(
                &mut second,
                &target.id,
                &event,
                false,
                Utc::now(),
            )
            .unwrap();

            prop_assert_eq!(outcome.disposition, Disposition::Duplicate);
            prop_assert_eq!(second, first);
        }
    }
}

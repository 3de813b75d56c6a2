use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use super::balance_aggregator::BalanceAggregator;
use crate::core::{AppError, Result, AMOUNT_TOLERANCE};
use crate::modules::ledger::models::{
    EmiStatus, Payment, PaymentMethod, PaymentStatus, Settlement, StudentLedger,
};
use crate::modules::reconciliation::models::{
    Disposition, PaymentClassification, PaymentEvent, ReconciliationTarget,
};

/// Result of applying one event to a ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOutcome {
    pub disposition: Disposition,
    pub classification: Option<PaymentClassification>,
}

impl EngineOutcome {
    fn duplicate() -> Self {
        Self {
            disposition: Disposition::Duplicate,
            classification: None,
        }
    }
}

/// Applies payment events to a [`StudentLedger`].
///
/// Pure and synchronous: every function takes the ledger and the clock
/// explicitly and runs inside a store transaction. The student balance is
/// always recomputed from scratch, so replaying an event cannot double-count.
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    /// Classify a payment-level success event by its amount.
    ///
    /// Checked in order, with a tolerance of 0.01:
    /// 1. amount covers the total -> full payment
    /// 2. amount matches the deposit -> deposit only
    /// 3. amount covers what is still outstanding -> full payment
    /// 4. anything else -> partial other
    ///
    /// When `collecting_balance` is set the event settles the payment's own
    /// outstanding-balance charge, and rule 3 is checked before rule 2.
    pub fn classify(
        amount: Decimal,
        payment: &Payment,
        applied: Decimal,
        collecting_balance: bool,
    ) -> PaymentClassification {
        if amount >= payment.total_amount - AMOUNT_TOLERANCE {
            return PaymentClassification::FullPayment;
        }

        let outstanding = payment.total_amount - applied;
        let covers_outstanding =
            outstanding > Decimal::ZERO && amount >= outstanding - AMOUNT_TOLERANCE;
        if collecting_balance && covers_outstanding {
            return PaymentClassification::FullPayment;
        }

        if payment.deposit_amount > Decimal::ZERO
            && (amount - payment.deposit_amount).abs() <= AMOUNT_TOLERANCE
        {
            return PaymentClassification::DepositOnly;
        }

        if covers_outstanding {
            return PaymentClassification::FullPayment;
        }

        PaymentClassification::PartialOther
    }

    /// The event settles a charge raised against this payment's outstanding balance
    fn is_balance_charge(payment: &Payment, gateway_id: &str) -> bool {
        payment.status == PaymentStatus::Processing
            || payment.gateway_payment_id.as_deref() == Some(gateway_id)
    }

    /// Apply a gateway success event to a payment (deposit or full settlement).
    ///
    /// # Business Rules
    /// - An event whose gateway id is already the payment's transaction id is a duplicate
    /// - Refunded payments reject success events; failed payments are revived
    /// - Deposit only: every installment goes back to pending with its
    ///   settlement cleared, except installments paid by a different gateway payment
    /// - Full payment: outstanding installments are settled by this event and
    ///   the payment is completed
    /// - Partial other: logged, payment becomes partial
    pub fn apply_payment_success(
        ledger: &mut StudentLedger,
        payment_id: &str,
        event: &PaymentEvent,
        now: DateTime<Utc>,
    ) -> Result<EngineOutcome> {
        let gateway_id = event.gateway_payment_id.as_str();
        let payment = ledger
            .payment(payment_id)
            .cloned()
            .ok_or_else(|| payment_not_found(payment_id, ledger.student_id()))?;

        if payment.transaction_id.as_deref() == Some(gateway_id) {
            info!(
                payment_id = %payment.id,
                gateway_payment_id = %gateway_id,
                "Success event already applied to payment"
            );
            return Ok(EngineOutcome::duplicate());
        }

        if payment.status == PaymentStatus::Refunded {
            return Err(AppError::invalid_state(
                format!("Payment {} was refunded", payment.id),
                payment.status,
            ));
        }

        BalanceAggregator::detect_drift(ledger);

        let applied = ledger.applied_amount(payment_id);
        let classification = Self::classify(
            event.amount,
            &payment,
            applied,
            Self::is_balance_charge(&payment, gateway_id),
        );
        info!(
            payment_id = %payment.id,
            student_id = %payment.student_id,
            gateway_payment_id = %gateway_id,
            amount = %event.amount,
            classification = %classification,
            "Applying payment success"
        );

        {
            let target = ledger.require_payment_mut(payment_id)?;
            target.gateway_payment_id = Some(gateway_id.to_string());
            target.transaction_id = Some(gateway_id.to_string());
            target.gateway_provider = Some(event.provider);
            target.gateway_response = event.gateway_response.clone();
            target.paid_date = Some(now);
            if target.status == PaymentStatus::Failed {
                info!(payment_id = %target.id, "Success event revives failed payment");
                target.set_status(PaymentStatus::Pending, now);
            }
        }

        match classification {
            PaymentClassification::DepositOnly => {
                for emi in ledger.emis_for_mut(payment_id) {
                    if emi.status == EmiStatus::Cancelled {
                        continue;
                    }
                    if emi.status == EmiStatus::Paid
                        && emi.gateway_payment_id.as_deref() != Some(gateway_id)
                    {
                        warn!(
                            emi_payment_id = %emi.id,
                            gateway_payment_id = ?emi.gateway_payment_id,
                            "Keeping installment settled by another gateway payment"
                        );
                        continue;
                    }
                    emi.reset_to_pending(now);
                }
                Self::rollup_payment_status(ledger, payment_id, now)?;
            }
            PaymentClassification::FullPayment => {
                let settlement = Settlement::from_gateway(gateway_id, now)?;
                for emi in ledger.emis_for_mut(payment_id) {
                    if emi.is_outstanding() {
                        emi.mark_paid(&settlement, PaymentMethod::Online, now)?;
                    }
                }

                let applied = ledger.applied_amount(payment_id);
                let target = ledger.require_payment_mut(payment_id)?;
                let shortfall = target.total_amount - applied;
                if shortfall > Decimal::ZERO {
                    debug!(
                        payment_id = %target.id,
                        shortfall = %shortfall,
                        "Crediting full payment shortfall to the deposit"
                    );
                    let deposit = target.deposit_amount + shortfall;
                    target.set_deposit(deposit, now);
                }
                target.set_status(PaymentStatus::Completed, now);
            }
            PaymentClassification::PartialOther => {
                warn!(
                    payment_id = %payment.id,
                    amount = %event.amount,
                    deposit = %payment.deposit_amount,
                    total = %payment.total_amount,
                    "Success amount matches neither deposit nor outstanding balance"
                );
                let target = ledger.require_payment_mut(payment_id)?;
                if target.status != PaymentStatus::Completed {
                    target.set_status(PaymentStatus::Partial, now);
                }
            }
        }

        BalanceAggregator::apply(ledger, now);

        Ok(EngineOutcome {
            disposition: Disposition::Applied,
            classification: Some(classification),
        })
    }

    /// Settle one installment from a gateway success event.
    ///
    /// # Business Rules
    /// - A paid installment with the same gateway id is a duplicate; a
    ///   different gateway id is rejected
    /// - Cancelled installments reject settlement
    /// - While the parent payment has its own charge in flight (processing,
    ///   or owning this gateway id) the installment is locked unless
    ///   `force_override` is set
    pub fn apply_emi_success(
        ledger: &mut StudentLedger,
        emi_payment_id: &str,
        event: &PaymentEvent,
        force_override: bool,
        now: DateTime<Utc>,
    ) -> Result<EngineOutcome> {
        let gateway_id = event.gateway_payment_id.as_str();
        let emi = ledger.require_emi_mut(emi_payment_id)?.clone();

        match emi.status {
            EmiStatus::Paid if emi.gateway_payment_id.as_deref() == Some(gateway_id) => {
                info!(
                    emi_payment_id = %emi.id,
                    gateway_payment_id = %gateway_id,
                    "Success event already applied to installment"
                );
                return Ok(EngineOutcome::duplicate());
            }
            EmiStatus::Paid => {
                return Err(AppError::invalid_state(
                    format!(
                        "Installment {} was settled by another gateway payment",
                        emi.id
                    ),
                    emi.status,
                ));
            }
            EmiStatus::Cancelled => {
                return Err(AppError::invalid_state(
                    format!("Installment {} is cancelled", emi.id),
                    emi.status,
                ));
            }
            _ => {}
        }

        let parent = ledger.payment(&emi.payment_id).cloned().ok_or_else(|| {
            AppError::consistency(format!(
                "Installment {} references missing payment {}",
                emi.id, emi.payment_id
            ))
        })?;

        let locked = parent.status == PaymentStatus::Processing
            || parent.gateway_payment_id.as_deref() == Some(gateway_id);
        if locked {
            if !force_override {
                return Err(AppError::invalid_state(
                    format!(
                        "Installment {} is locked while payment {} has a charge in flight",
                        emi.id, parent.id
                    ),
                    parent.status,
                ));
            }
            warn!(
                emi_payment_id = %emi.id,
                payment_id = %parent.id,
                gateway_payment_id = %gateway_id,
                "Deposit lock bypassed by override"
            );
        }

        BalanceAggregator::detect_drift(ledger);

        if (event.amount - emi.amount).abs() > AMOUNT_TOLERANCE {
            warn!(
                emi_payment_id = %emi.id,
                expected = %emi.amount,
                received = %event.amount,
                "Installment settled with a different amount"
            );
        }

        let settlement = Settlement::from_gateway(gateway_id, now)?;
        {
            let target = ledger.require_emi_mut(emi_payment_id)?;
            target.mark_paid(&settlement, PaymentMethod::Online, now)?;
            target.gateway_response = event.gateway_response.clone();
        }

        info!(
            emi_payment_id = %emi.id,
            payment_id = %emi.payment_id,
            student_id = %emi.student_id,
            gateway_payment_id = %gateway_id,
            "Installment settled"
        );

        Self::rollup_payment_status(ledger, &emi.payment_id, now)?;
        BalanceAggregator::apply(ledger, now);

        Ok(EngineOutcome {
            disposition: Disposition::Applied,
            classification: None,
        })
    }

    /// Record a failed charge; statuses are left alone
    pub fn apply_failure(
        ledger: &mut StudentLedger,
        target: &ReconciliationTarget,
        event: &PaymentEvent,
        now: DateTime<Utc>,
    ) -> Result<EngineOutcome> {
        let diagnostics = event
            .gateway_response
            .clone()
            .or_else(|| event.failure_message.clone());

        match target {
            ReconciliationTarget::Payment { payment_id } => {
                let payment = ledger.require_payment_mut(payment_id)?;
                payment.gateway_response = diagnostics;
                payment.updated_at = now;
            }
            ReconciliationTarget::EmiPayment { emi_payment_id, .. } => {
                let emi = ledger.require_emi_mut(emi_payment_id)?;
                emi.gateway_response = diagnostics;
                emi.updated_at = now;
            }
        }

        warn!(
            gateway_payment_id = %event.gateway_payment_id,
            failure = event.failure_message.as_deref().unwrap_or("unknown"),
            "Gateway reported a failed charge"
        );

        Ok(EngineOutcome {
            disposition: Disposition::FailureRecorded,
            classification: None,
        })
    }

    /// Derive a payment's status from the money applied to it.
    ///
    /// Completed once the applied amount covers the total and no installment
    /// is outstanding; partial while some money is applied. Failed and
    /// refunded payments are left alone.
    pub fn rollup_payment_status(
        ledger: &mut StudentLedger,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatus> {
        let applied = ledger.applied_amount(payment_id);
        let outstanding = ledger.outstanding_emi_count(payment_id);
        let payment = ledger.require_payment_mut(payment_id)?;

        if payment.status.is_terminal() {
            return Ok(payment.status);
        }

        let covered = applied >= payment.total_amount - AMOUNT_TOLERANCE;
        let next = if covered && outstanding == 0 {
            PaymentStatus::Completed
        } else if applied > Decimal::ZERO {
            if !covered && outstanding == 0 {
                warn!(
                    payment_id = %payment.id,
                    applied = %applied,
                    total = %payment.total_amount,
                    "All installments settled but the payment is not covered"
                );
            }
            PaymentStatus::Partial
        } else if payment.status == PaymentStatus::Completed {
            PaymentStatus::Pending
        } else {
            payment.status
        };

        payment.set_status(next, now);
        Ok(next)
    }
}

fn payment_not_found(payment_id: &str, student_id: &str) -> AppError {
    AppError::not_found(
        "Payment",
        format!("paymentId={}, studentId={}", payment_id, student_id),
    )
}

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;

use super::{EmiPayment, EmiStatus, Payment, PaymentStatus, Student};
use crate::core::{AppError, Result, AMOUNT_TOLERANCE};

/// A student together with every payment and installment they own.
///
/// This is the unit the ledger store locks, mutates and writes back as one
/// transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentLedger {
    pub student: Student,
    pub payments: Vec<Payment>,
    pub emi_payments: Vec<EmiPayment>,
}

/// A document number the store still has to issue
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumberSlot {
    Invoice { payment_id: String },
    PaymentReceipt { payment_id: String },
    EmiReceipt { emi_payment_id: String },
}

impl NumberSlot {
    /// Sequence prefix for the number
    pub fn prefix(&self) -> &'static str {
        match self {
            NumberSlot::Invoice { .. } => "INV",
            NumberSlot::PaymentReceipt { .. } => "RCP",
            NumberSlot::EmiReceipt { .. } => "EMI",
        }
    }
}

impl StudentLedger {
    pub fn new(student: Student, payments: Vec<Payment>, emi_payments: Vec<EmiPayment>) -> Self {
        Self {
            student,
            payments,
            emi_payments,
        }
    }

    pub fn student_id(&self) -> &str {
        &self.student.id
    }

    pub fn payment(&self, payment_id: &str) -> Option<&Payment> {
        self.payments.iter().find(|p| p.id == payment_id)
    }

    pub fn payment_mut(&mut self, payment_id: &str) -> Option<&mut Payment> {
        self.payments.iter_mut().find(|p| p.id == payment_id)
    }

    /// Like [`payment_mut`](Self::payment_mut) but a miss is a `NotFound`
    pub fn require_payment_mut(&mut self, payment_id: &str) -> Result<&mut Payment> {
        let student_id = self.student.id.clone();
        self.payment_mut(payment_id).ok_or_else(|| {
            AppError::not_found(
                "Payment",
                format!("paymentId={}, studentId={}", payment_id, student_id),
            )
        })
    }

    pub fn emi(&self, emi_payment_id: &str) -> Option<&EmiPayment> {
        self.emi_payments.iter().find(|e| e.id == emi_payment_id)
    }

    pub fn emi_mut(&mut self, emi_payment_id: &str) -> Option<&mut EmiPayment> {
        self.emi_payments.iter_mut().find(|e| e.id == emi_payment_id)
    }

    pub fn require_emi_mut(&mut self, emi_payment_id: &str) -> Result<&mut EmiPayment> {
        let student_id = self.student.id.clone();
        self.emi_mut(emi_payment_id).ok_or_else(|| {
            AppError::not_found(
                "EMIPayment",
                format!("emiPaymentId={}, studentId={}", emi_payment_id, student_id),
            )
        })
    }

    /// Installments of one payment, ordered by installment number
    pub fn emis_for(&self, payment_id: &str) -> Vec<&EmiPayment> {
        let mut emis: Vec<&EmiPayment> = self
            .emi_payments
            .iter()
            .filter(|e| e.payment_id == payment_id)
            .collect();
        emis.sort_by_key(|e| e.installment_number);
        emis
    }

    pub fn emis_for_mut(&mut self, payment_id: &str) -> impl Iterator<Item = &mut EmiPayment> {
        let payment_id = payment_id.to_string();
        self.emi_payments
            .iter_mut()
            .filter(move |e| e.payment_id == payment_id)
    }

    /// Money applied to one payment: its deposit plus every paid installment
    pub fn applied_amount(&self, payment_id: &str) -> Decimal {
        let deposit = self
            .payment(payment_id)
            .map(|p| p.deposit_amount)
            .unwrap_or(Decimal::ZERO);
        deposit + self.paid_emi_sum(payment_id)
    }

    pub fn paid_emi_sum(&self, payment_id: &str) -> Decimal {
        self.emi_payments
            .iter()
            .filter(|e| e.payment_id == payment_id && e.status == EmiStatus::Paid)
            .map(|e| e.amount)
            .sum()
    }

    /// Installments still expecting money (pending, overdue or processing)
    pub fn outstanding_emi_count(&self, payment_id: &str) -> usize {
        self.emi_payments
            .iter()
            .filter(|e| e.payment_id == payment_id && e.is_outstanding())
            .count()
    }

    /// Student-wide paid amount recomputed from scratch: deposits of every
    /// payment that has not failed plus every paid installment
    pub fn aggregate_paid_amount(&self) -> Decimal {
        let deposits: Decimal = self
            .payments
            .iter()
            .filter(|p| p.status != PaymentStatus::Failed)
            .map(|p| p.deposit_amount)
            .sum();
        let installments: Decimal = self
            .emi_payments
            .iter()
            .filter(|e| e.status == EmiStatus::Paid)
            .map(|e| e.amount)
            .sum();
        deposits + installments
    }

    /// Most recently created payment still expecting money
    pub fn latest_open_payment(&self) -> Option<&Payment> {
        self.payments
            .iter()
            .filter(|p| p.status.is_open())
            .max_by_key(|p| p.created_at)
    }

    /// Earliest-due pending or overdue installment
    pub fn earliest_open_emi(&self) -> Option<&EmiPayment> {
        self.emi_payments
            .iter()
            .filter(|e| e.is_open())
            .min_by_key(|e| (e.due_date, e.installment_number))
    }

    /// Flag pending installments whose due date has passed.
    /// Returns the number of installments that changed.
    pub fn refresh_overdue(&mut self, today: NaiveDate, now: DateTime<Utc>) -> usize {
        let mut changed = 0;
        for emi in self.emi_payments.iter_mut() {
            if emi.refresh_overdue(today, now) {
                changed += 1;
            }
        }
        changed
    }

    pub fn add_payment(&mut self, payment: Payment, emis: Vec<EmiPayment>) {
        self.payments.push(payment);
        self.emi_payments.extend(emis);
    }

    /// Remove a payment and cascade to its installments
    pub fn remove_payment(&mut self, payment_id: &str) -> Result<(Payment, Vec<EmiPayment>)> {
        let index = self
            .payments
            .iter()
            .position(|p| p.id == payment_id)
            .ok_or_else(|| {
                AppError::not_found(
                    "Payment",
                    format!("paymentId={}, studentId={}", payment_id, self.student.id),
                )
            })?;
        let payment = self.payments.remove(index);

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.emi_payments)
            .into_iter()
            .partition(|e| e.payment_id == payment_id);
        self.emi_payments = kept;

        Ok((payment, removed))
    }

    /// Invoice and receipt slots that still need a number
    pub fn missing_numbers(&self) -> Vec<NumberSlot> {
        let mut slots = Vec::new();

        for payment in &self.payments {
            if payment.invoice_number.is_none() {
                slots.push(NumberSlot::Invoice {
                    payment_id: payment.id.clone(),
                });
            }
            if payment.needs_receipt() {
                slots.push(NumberSlot::PaymentReceipt {
                    payment_id: payment.id.clone(),
                });
            }
        }

        let mut emis: Vec<&EmiPayment> = self.emi_payments.iter().filter(|e| e.needs_receipt()).collect();
        emis.sort_by_key(|e| (e.payment_id.clone(), e.installment_number));
        for emi in emis {
            slots.push(NumberSlot::EmiReceipt {
                emi_payment_id: emi.id.clone(),
            });
        }

        slots
    }

    /// Write an issued number into its slot
    pub fn assign_number(&mut self, slot: &NumberSlot, number: String) -> Result<()> {
        match slot {
            NumberSlot::Invoice { payment_id } => {
                self.require_payment_mut(payment_id)?.invoice_number = Some(number);
            }
            NumberSlot::PaymentReceipt { payment_id } => {
                self.require_payment_mut(payment_id)?.receipt_number = Some(number);
            }
            NumberSlot::EmiReceipt { emi_payment_id } => {
                self.require_emi_mut(emi_payment_id)?.receipt_number = Some(number);
            }
        }
        Ok(())
    }

    /// Check every structural invariant of the ledger.
    ///
    /// Called by the store right before commit; any violation aborts the write.
    pub fn check_invariants(&self) -> Result<()> {
        let student_id = &self.student.id;
        let mut payment_ids = HashSet::new();

        for payment in &self.payments {
            if &payment.student_id != student_id {
                return Err(AppError::consistency(format!(
                    "Payment {} belongs to student {}, not {}",
                    payment.id, payment.student_id, student_id
                )));
            }
            if payment.total_amount <= Decimal::ZERO
                || payment.deposit_amount < Decimal::ZERO
                || payment.deposit_amount > payment.total_amount
            {
                return Err(AppError::consistency(format!(
                    "Payment {} has total {} and deposit {}",
                    payment.id, payment.total_amount, payment.deposit_amount
                )));
            }
            if payment.remaining_amount != payment.total_amount - payment.deposit_amount {
                return Err(AppError::consistency(format!(
                    "Payment {} remaining {} does not equal total {} - deposit {}",
                    payment.id,
                    payment.remaining_amount,
                    payment.total_amount,
                    payment.deposit_amount
                )));
            }
            if payment.status == PaymentStatus::Completed
                && self.applied_amount(&payment.id) < payment.total_amount - AMOUNT_TOLERANCE
            {
                return Err(AppError::consistency(format!(
                    "Payment {} is completed but only {} of {} was applied",
                    payment.id,
                    self.applied_amount(&payment.id),
                    payment.total_amount
                )));
            }
            payment_ids.insert(payment.id.as_str());
        }

        let mut numbers = HashSet::new();
        for emi in &self.emi_payments {
            let Some(parent) = self.payment(&emi.payment_id) else {
                return Err(AppError::consistency(format!(
                    "Installment {} references missing payment {}",
                    emi.id, emi.payment_id
                )));
            };
            if emi.student_id != parent.student_id {
                return Err(AppError::consistency(format!(
                    "Installment {} student {} does not match payment student {}",
                    emi.id, emi.student_id, parent.student_id
                )));
            }
            if emi.amount <= Decimal::ZERO {
                return Err(AppError::consistency(format!(
                    "Installment {} has non-positive amount {}",
                    emi.id, emi.amount
                )));
            }
            if !numbers.insert((emi.payment_id.as_str(), emi.installment_number)) {
                return Err(AppError::consistency(format!(
                    "Installment number {} repeats within payment {}",
                    emi.installment_number, emi.payment_id
                )));
            }
            if (emi.status == EmiStatus::Paid) != emi.has_settlement_evidence() {
                return Err(AppError::consistency(format!(
                    "Installment {} is {} but settlement evidence is {}",
                    emi.id,
                    emi.status,
                    if emi.has_settlement_evidence() {
                        "present"
                    } else {
                        "incomplete"
                    }
                )));
            }
        }

        let paid = self.aggregate_paid_amount();
        if self.student.paid_amount != paid {
            return Err(AppError::consistency(format!(
                "Student {} paid amount {} does not match aggregate {}",
                student_id, self.student.paid_amount, paid
            )));
        }
        if self.student.remaining_amount != self.student.total_fees - self.student.paid_amount {
            return Err(AppError::consistency(format!(
                "Student {} remaining {} does not equal total fees {} - paid {}",
                student_id,
                self.student.remaining_amount,
                self.student.total_fees,
                self.student.paid_amount
            )));
        }

        Ok(())
    }
}

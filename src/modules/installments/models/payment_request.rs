use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Currency, Result};
use crate::modules::ledger::models::{EmiPayment, PaymentMethod, Payment};

/// Upper bound on installments per payment
pub const MAX_INSTALLMENTS: i32 = 36;

/// One entry of an explicit installment schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    pub installment_number: i32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
}

/// Request to register a fee obligation for a student
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub student_id: String,
    pub course_name: String,
    pub total_amount: Decimal,
    #[serde(default)]
    pub deposit_amount: Decimal,
    /// Falls back to the service's default currency
    #[serde(default)]
    pub currency: Option<Currency>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
    /// Payment due date; also the first projected installment date
    pub due_date: Option<NaiveDate>,
    /// Equal-split plan, projected monthly from `due_date`
    pub installment_count: Option<i32>,
    /// Explicit plan; takes precedence over `installment_count`
    #[serde(default)]
    pub installments: Vec<ScheduledInstallment>,
    pub notes: Option<String>,
}

impl CreatePaymentRequest {
    /// Validate everything that can be checked without the ledger
    pub fn validate(&self) -> Result<()> {
        if self.student_id.trim().is_empty() {
            return Err(AppError::validation("Student id is required"));
        }

        if self.course_name.trim().is_empty() {
            return Err(AppError::validation("Course name is required"));
        }

        if self.total_amount <= Decimal::ZERO {
            return Err(AppError::validation(format!(
                "Total amount must be positive, got {}",
                self.total_amount
            )));
        }

        if self.deposit_amount < Decimal::ZERO || self.deposit_amount > self.total_amount {
            return Err(AppError::validation(format!(
                "Deposit amount must be between 0 and {}, got {}",
                self.total_amount, self.deposit_amount
            )));
        }

        self.currency().validate_amount(self.total_amount)?;
        self.currency().validate_amount(self.deposit_amount)?;

        if let Some(count) = self.installment_count {
            if !(1..=MAX_INSTALLMENTS).contains(&count) {
                return Err(AppError::validation(format!(
                    "Installment count must be between 1 and {}, got {}",
                    MAX_INSTALLMENTS, count
                )));
            }
        }

        if self.installments.len() > MAX_INSTALLMENTS as usize {
            return Err(AppError::validation(format!(
                "At most {} installments are allowed, got {}",
                MAX_INSTALLMENTS,
                self.installments.len()
            )));
        }

        Ok(())
    }

    pub fn currency(&self) -> Currency {
        self.currency.unwrap_or_default()
    }

    /// Amount left for installments after the deposit
    pub fn remaining_amount(&self) -> Decimal {
        self.total_amount - self.deposit_amount
    }

    pub fn wants_installments(&self) -> bool {
        !self.installments.is_empty() || self.installment_count.is_some()
    }
}

/// A persisted payment with its installment plan
#[derive(Debug, Clone, Serialize)]
pub struct PlannedPayment {
    pub payment: Payment,
    pub installments: Vec<EmiPayment>,
}

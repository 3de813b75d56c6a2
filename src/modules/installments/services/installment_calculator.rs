use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::{debug, warn};

use crate::core::{AppError, Currency, Result};
use crate::modules::installments::models::{ScheduledInstallment, MAX_INSTALLMENTS};

/// Builds installment schedules for a payment's remaining amount
pub struct InstallmentCalculator;

impl InstallmentCalculator {
    /// Split `remaining` into `count` equal installments.
    ///
    /// Works in integer minor units; the final installment absorbs the
    /// remainder so the parts always sum to `remaining` exactly.
    ///
    /// # Arguments
    /// * `remaining` - Amount to split, in major units
    /// * `count` - Number of installments (1..=36)
    /// * `currency` - Determines the minor unit
    pub fn split_equal(remaining: Decimal, count: i32, currency: Currency) -> Result<Vec<Decimal>> {
        Self::check_count(count)?;

        let total_minor = currency.to_minor_units(remaining)?;
        let count_minor = i64::from(count);
        let base = total_minor / count_minor;
        let remainder = total_minor - base * count_minor;

        if base <= 0 {
            return Err(AppError::validation(format!(
                "Cannot split {} into {} positive installments",
                currency.format_amount(remaining),
                count
            )));
        }

        let amounts = (0..count_minor)
            .map(|i| {
                let minor = if i == count_minor - 1 {
                    base + remainder
                } else {
                    base
                };
                currency.from_minor_units(minor)
            })
            .collect();

        Ok(amounts)
    }

    /// Due dates one calendar month apart starting at `first_due`
    pub fn project_monthly(first_due: NaiveDate, count: i32) -> Result<Vec<NaiveDate>> {
        Self::check_count(count)?;

        (0..count as u32)
            .map(|i| {
                first_due
                    .checked_add_months(chrono::Months::new(i))
                    .ok_or_else(|| AppError::validation("Failed to calculate due date"))
            })
            .collect()
    }

    /// Equal-split schedule projected monthly from `first_due`
    pub fn build_schedule(
        remaining: Decimal,
        count: i32,
        first_due: NaiveDate,
        currency: Currency,
    ) -> Result<Vec<ScheduledInstallment>> {
        let amounts = Self::split_equal(remaining, count, currency)?;
        let dates = Self::project_monthly(first_due, count)?;

        let schedule: Vec<ScheduledInstallment> = amounts
            .into_iter()
            .zip(dates)
            .enumerate()
            .map(|(i, (amount, due_date))| ScheduledInstallment {
                installment_number: i as i32 + 1,
                amount,
                due_date,
            })
            .collect();

        debug!(
            count = schedule.len(),
            remaining = %remaining,
            "Projected equal installment schedule"
        );

        Ok(schedule)
    }

    /// Validate an explicit schedule and return it ordered by installment number.
    ///
    /// Amounts must be positive and numbers unique and 1-based. A sum that
    /// differs from `remaining` is accepted and logged.
    pub fn validate_explicit(
        schedule: &[ScheduledInstallment],
        remaining: Decimal,
        currency: Currency,
    ) -> Result<Vec<ScheduledInstallment>> {
        Self::check_count(schedule.len() as i32)?;

        let mut ordered = schedule.to_vec();
        ordered.sort_by_key(|s| s.installment_number);

        for pair in ordered.windows(2) {
            if pair[0].installment_number == pair[1].installment_number {
                return Err(AppError::validation(format!(
                    "Installment number {} appears more than once",
                    pair[0].installment_number
                )));
            }
        }

        for entry in &ordered {
            if entry.installment_number < 1 {
                return Err(AppError::validation(format!(
                    "Installment numbers start at 1, got {}",
                    entry.installment_number
                )));
            }
            if entry.amount <= Decimal::ZERO {
                return Err(AppError::validation(format!(
                    "Installment {} amount must be positive",
                    entry.installment_number
                )));
            }
            currency.validate_amount(entry.amount)?;
        }

        let sum: Decimal = ordered.iter().map(|s| s.amount).sum();
        if sum != remaining {
            warn!(
                scheduled = %sum,
                remaining = %remaining,
                drift = %(sum - remaining),
                "Explicit installment schedule does not sum to the remaining amount"
            );
        }

        Ok(ordered)
    }

    fn check_count(count: i32) -> Result<()> {
        if !(1..=MAX_INSTALLMENTS).contains(&count) {
            return Err(AppError::validation(format!(
                "Installment count must be between 1 and {}, got {}",
                MAX_INSTALLMENTS, count
            )));
        }
        Ok(())
    }
}

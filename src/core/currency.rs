use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{AppError, Result};

/// Two amounts closer than this are treated as equal when classifying gateway amounts
pub const AMOUNT_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// Supported currencies with their decimal precision rules
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Indian Rupee (2 decimal places, paisa)
    #[default]
    INR,
    /// US Dollar (2 decimal places)
    USD,
    /// Euro (2 decimal places)
    EUR,
    /// Pound Sterling (2 decimal places)
    GBP,
}

impl Currency {
    /// Returns the decimal scale for this currency
    pub fn scale(&self) -> u32 {
        match self {
            Currency::INR | Currency::USD | Currency::EUR | Currency::GBP => 2,
        }
    }

    /// Rounds a decimal value to the appropriate scale for this currency
    pub fn round(&self, amount: Decimal) -> Decimal {
        amount.round_dp(self.scale())
    }

    /// Validates that a decimal value has the correct scale for this currency
    pub fn validate_amount(&self, amount: Decimal) -> Result<()> {
        if amount.normalize().scale() > self.scale() {
            return Err(AppError::validation(format!(
                "{} amounts must have at most {} decimal places, got {}",
                self,
                self.scale(),
                amount
            )));
        }

        if amount < Decimal::ZERO {
            return Err(AppError::validation(format!(
                "{} amount cannot be negative",
                self
            )));
        }

        Ok(())
    }

    /// Number of minor units (paisa, cents) in one major unit
    fn minor_per_major(&self) -> i64 {
        10_i64.pow(self.scale())
    }

    /// Converts a major-unit amount to integer minor units
    pub fn to_minor_units(&self, amount: Decimal) -> Result<i64> {
        self.validate_amount(amount)?;
        (amount * Decimal::from(self.minor_per_major()))
            .to_i64()
            .ok_or_else(|| AppError::validation(format!("{} amount {} is out of range", self, amount)))
    }

    /// Converts integer minor units back to a major-unit amount
    pub fn from_minor_units(&self, minor: i64) -> Decimal {
        Decimal::new(minor, self.scale())
    }

    /// Lowercase ISO code as the gateway expects it
    pub fn gateway_code(&self) -> String {
        self.to_string().to_lowercase()
    }

    /// Formats an amount for display with the correct decimal places
    pub fn format_amount(&self, amount: Decimal) -> String {
        format!(
            "{} {:.width$}",
            self,
            amount,
            width = self.scale() as usize
        )
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Currency::INR => write!(f, "INR"),
            Currency::USD => write!(f, "USD"),
            Currency::EUR => write!(f, "EUR"),
            Currency::GBP => write!(f, "GBP"),
        }
    }
}

impl std::str::FromStr for Currency {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "INR" => Ok(Currency::INR),
            "USD" => Ok(Currency::USD),
            "EUR" => Ok(Currency::EUR),
            "GBP" => Ok(Currency::GBP),
            _ => Err(AppError::validation(format!("Invalid currency: {}", s))),
        }
    }
}

impl TryFrom<String> for Currency {
    type Error = AppError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core::{AppError, Result};

/// Balance-relevant view of a student
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub total_fees: Decimal,
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub fee_status: FeeStatus,
    pub status: EnrollmentStatus,
    pub next_payment_due: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived balance fields, see `BalanceAggregator`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentBalance {
    pub paid_amount: Decimal,
    pub remaining_amount: Decimal,
    pub fee_status: FeeStatus,
    pub next_payment_due: Option<NaiveDate>,
    pub enrollment_status: EnrollmentStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeStatus {
    Pending,
    Partial,
    Complete,
    Overdue,
}

impl FeeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Complete => "complete",
            Self::Overdue => "overdue",
        }
    }
}

impl std::fmt::Display for FeeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FeeStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "partial" => Ok(Self::Partial),
            "complete" => Ok(Self::Complete),
            "overdue" => Ok(Self::Overdue),
            _ => Err(AppError::validation(format!("Invalid fee status: {}", value))),
        }
    }
}

impl TryFrom<String> for FeeStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Enrollment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStatus {
    Active,
    Inactive,
    Pending,
    Graduated,
    Dropped,
}

impl EnrollmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Pending => "pending",
            Self::Graduated => "graduated",
            Self::Dropped => "dropped",
        }
    }

    /// Graduated and dropped students are never moved by fee changes
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Graduated | Self::Dropped)
    }
}

impl std::fmt::Display for EnrollmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EnrollmentStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "pending" => Ok(Self::Pending),
            "graduated" => Ok(Self::Graduated),
            "dropped" => Ok(Self::Dropped),
            _ => Err(AppError::validation(format!(
                "Invalid enrollment status: {}",
                value
            ))),
        }
    }
}

impl TryFrom<String> for EnrollmentStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl Student {
    /// New enrollment with no fees registered yet
    pub fn new(id: impl Into<String>, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            email: None,
            total_fees: Decimal::ZERO,
            paid_amount: Decimal::ZERO,
            remaining_amount: Decimal::ZERO,
            fee_status: FeeStatus::Pending,
            status: EnrollmentStatus::Pending,
            next_payment_due: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_total_fees(mut self, total_fees: Decimal) -> Self {
        self.total_fees = total_fees;
        self.remaining_amount = total_fees - self.paid_amount;
        self
    }

    /// Current balance fields as stored
    pub fn balance(&self) -> StudentBalance {
        StudentBalance {
            paid_amount: self.paid_amount,
            remaining_amount: self.remaining_amount,
            fee_status: self.fee_status,
            next_payment_due: self.next_payment_due,
            enrollment_status: self.status,
        }
    }

    /// Overwrite every balance field with a freshly computed aggregate
    pub fn apply_balance(&mut self, balance: &StudentBalance, now: DateTime<Utc>) {
        self.paid_amount = balance.paid_amount;
        self.remaining_amount = balance.remaining_amount;
        self.fee_status = balance.fee_status;
        self.next_payment_due = balance.next_payment_due;
        self.status = balance.enrollment_status;
        self.updated_at = now;
    }
}

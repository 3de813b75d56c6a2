use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::{AppError, Currency, Result};

/// One fee obligation of a student for one course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    pub id: String,
    pub student_id: String,
    pub course_name: String,
    pub total_amount: Decimal,
    /// Upfront portion collected outside the installment plan
    pub deposit_amount: Decimal,
    /// Always `total_amount - deposit_amount`
    pub remaining_amount: Decimal,
    pub installment_count: i32,
    pub status: PaymentStatus,
    pub payment_method: PaymentMethod,
    pub currency: Currency,
    /// Required while the payment is pending
    pub due_date: Option<NaiveDate>,
    pub paid_date: Option<DateTime<Utc>>,
    /// Assigned by the ledger store on first persist
    pub invoice_number: Option<String>,
    /// Assigned by the ledger store once money has been received
    pub receipt_number: Option<String>,
    pub gateway_provider: Option<GatewayProvider>,
    pub gateway_payment_id: Option<String>,
    pub transaction_id: Option<String>,
    /// Raw diagnostic payload from the last gateway interaction
    pub gateway_response: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Completed,
    Failed,
    Refunded,
    /// A gateway intent is in flight
    Processing,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Partial => "partial",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Processing => "processing",
        }
    }

    /// Statuses that still expect money to arrive
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Partial | Self::Processing)
    }

    /// Statuses only an administrator can set or leave
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Failed | Self::Refunded)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "partial" => Ok(Self::Partial),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "refunded" => Ok(Self::Refunded),
            "processing" => Ok(Self::Processing),
            _ => Err(AppError::validation(format!(
                "Invalid payment status: {}",
                value
            ))),
        }
    }
}

impl TryFrom<String> for PaymentStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// How the money was (or will be) collected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Upi,
    BankTransfer,
    Cheque,
    /// Collected through the online gateway
    Online,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Card => "card",
            Self::Upi => "upi",
            Self::BankTransfer => "bank_transfer",
            Self::Cheque => "cheque",
            Self::Online => "online",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "cash" => Ok(Self::Cash),
            "card" => Ok(Self::Card),
            "upi" => Ok(Self::Upi),
            "bank_transfer" => Ok(Self::BankTransfer),
            "cheque" => Ok(Self::Cheque),
            "online" => Ok(Self::Online),
            _ => Err(AppError::validation(format!(
                "Invalid payment method: {}",
                value
            ))),
        }
    }
}

impl TryFrom<String> for PaymentMethod {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatewayProvider {
    Stripe,
    Razorpay,
    Paypal,
}

impl GatewayProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Razorpay => "razorpay",
            Self::Paypal => "paypal",
        }
    }
}

impl std::fmt::Display for GatewayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for GatewayProvider {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "stripe" => Ok(Self::Stripe),
            "razorpay" => Ok(Self::Razorpay),
            "paypal" => Ok(Self::Paypal),
            _ => Err(AppError::validation(format!(
                "Invalid gateway provider: {}",
                value
            ))),
        }
    }
}

impl TryFrom<String> for GatewayProvider {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl Payment {
    /// Create a new payment with a blank invoice slot
    ///
    /// # Arguments
    /// * `student_id` - Owning student
    /// * `course_name` - Course or fee head this payment is for
    /// * `total_amount` - Full obligation, must be positive
    /// * `deposit_amount` - Upfront portion, `0 <= deposit <= total`
    /// * `installment_count` - Number of scheduled installments (at least 1)
    /// * `now` - Creation timestamp
    pub fn new(
        student_id: String,
        course_name: String,
        total_amount: Decimal,
        deposit_amount: Decimal,
        installment_count: i32,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if course_name.trim().is_empty() {
            return Err(AppError::validation("Course name is required"));
        }

        if total_amount <= Decimal::ZERO {
            return Err(AppError::validation("Total amount must be positive"));
        }

        if deposit_amount < Decimal::ZERO {
            return Err(AppError::validation("Deposit amount cannot be negative"));
        }

        if deposit_amount > total_amount {
            return Err(AppError::validation(format!(
                "Deposit amount ({}) cannot exceed total amount ({})",
                deposit_amount, total_amount
            )));
        }

        if installment_count < 1 {
            return Err(AppError::validation(format!(
                "Installment count must be at least 1, got {}",
                installment_count
            )));
        }

        currency.validate_amount(total_amount)?;
        currency.validate_amount(deposit_amount)?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            student_id,
            course_name,
            total_amount,
            deposit_amount,
            remaining_amount: total_amount - deposit_amount,
            installment_count,
            status: Self::initial_status(total_amount, deposit_amount),
            payment_method: PaymentMethod::default(),
            currency,
            due_date: None,
            paid_date: None,
            invoice_number: None,
            receipt_number: None,
            gateway_provider: None,
            gateway_payment_id: None,
            transaction_id: None,
            gateway_response: None,
            notes: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Status a freshly created payment starts in
    pub fn initial_status(total_amount: Decimal, deposit_amount: Decimal) -> PaymentStatus {
        if deposit_amount >= total_amount {
            PaymentStatus::Completed
        } else if deposit_amount > Decimal::ZERO {
            PaymentStatus::Partial
        } else {
            PaymentStatus::Pending
        }
    }

    /// Change the deposit and keep `remaining_amount` in step
    pub fn set_deposit(&mut self, deposit_amount: Decimal, now: DateTime<Utc>) {
        self.deposit_amount = deposit_amount.min(self.total_amount);
        self.remaining_amount = self.total_amount - self.deposit_amount;
        self.updated_at = now;
    }

    pub fn set_status(&mut self, status: PaymentStatus, now: DateTime<Utc>) {
        if self.status != status {
            tracing::debug!(
                payment_id = %self.id,
                from = %self.status,
                to = %status,
                "Payment status transition"
            );
            self.status = status;
        }
        self.updated_at = now;
    }

    /// Whether a receipt slot is waiting to be numbered
    pub fn needs_receipt(&self) -> bool {
        self.receipt_number.is_none() && self.paid_date.is_some()
    }

    /// Validate the fields that must hold before a write
    pub fn validate(&self) -> Result<()> {
        if self.total_amount <= Decimal::ZERO {
            return Err(AppError::validation("Total amount must be positive"));
        }

        if self.status == PaymentStatus::Pending && self.due_date.is_none() {
            return Err(AppError::validation(
                "Due date is required for pending payments",
            ));
        }

        Ok(())
    }
}

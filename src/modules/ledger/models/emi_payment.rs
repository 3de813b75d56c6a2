use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::payment::PaymentMethod;
use crate::core::{AppError, Result};

/// One scheduled installment of a [`Payment`](super::Payment)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmiPayment {
    pub id: String,
    pub payment_id: String,
    /// Denormalized from the owning payment
    pub student_id: String,
    /// 1-based, unique within the owning payment
    pub installment_number: i32,
    pub amount: Decimal,
    pub due_date: NaiveDate,
    pub paid_date: Option<DateTime<Utc>>,
    pub status: EmiStatus,
    pub payment_method: Option<PaymentMethod>,
    pub transaction_id: Option<String>,
    pub receipt_number: Option<String>,
    pub gateway_payment_id: Option<String>,
    pub gateway_response: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmiStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
    Processing,
}

impl EmiStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Paid => "paid",
            Self::Overdue => "overdue",
            Self::Cancelled => "cancelled",
            Self::Processing => "processing",
        }
    }
}

impl std::fmt::Display for EmiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for EmiStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "paid" => Ok(Self::Paid),
            "overdue" => Ok(Self::Overdue),
            "cancelled" => Ok(Self::Cancelled),
            "processing" => Ok(Self::Processing),
            _ => Err(AppError::validation(format!(
                "Invalid installment status: {}",
                value
            ))),
        }
    }
}

impl TryFrom<String> for EmiStatus {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Evidence that an installment was settled.
///
/// All three members are required and non-blank; holding a `Settlement` is
/// the only way to move an installment to `paid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settlement {
    paid_date: DateTime<Utc>,
    transaction_id: String,
    gateway_payment_id: String,
}

impl Settlement {
    pub fn new(
        paid_date: DateTime<Utc>,
        transaction_id: impl Into<String>,
        gateway_payment_id: impl Into<String>,
    ) -> Result<Self> {
        let transaction_id = transaction_id.into();
        let gateway_payment_id = gateway_payment_id.into();

        if transaction_id.trim().is_empty() {
            return Err(AppError::validation(
                "Settlement requires a transaction id",
            ));
        }
        if gateway_payment_id.trim().is_empty() {
            return Err(AppError::validation(
                "Settlement requires a gateway payment id",
            ));
        }

        Ok(Self {
            paid_date,
            transaction_id,
            gateway_payment_id,
        })
    }

    /// Settlement where the gateway id doubles as the transaction id
    pub fn from_gateway(gateway_payment_id: &str, paid_date: DateTime<Utc>) -> Result<Self> {
        Self::new(paid_date, gateway_payment_id, gateway_payment_id)
    }

    pub fn paid_date(&self) -> DateTime<Utc> {
        self.paid_date
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    pub fn gateway_payment_id(&self) -> &str {
        &self.gateway_payment_id
    }
}

impl EmiPayment {
    /// Create a pending installment
    pub fn new(
        payment_id: String,
        student_id: String,
        installment_number: i32,
        amount: Decimal,
        due_date: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if installment_number < 1 {
            return Err(AppError::validation(format!(
                "Installment number must be 1 or greater, got {}",
                installment_number
            )));
        }

        if amount <= Decimal::ZERO {
            return Err(AppError::validation(format!(
                "Installment {} amount must be positive",
                installment_number
            )));
        }

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            payment_id,
            student_id,
            installment_number,
            amount,
            due_date,
            paid_date: None,
            status: EmiStatus::Pending,
            payment_method: None,
            transaction_id: None,
            receipt_number: None,
            gateway_payment_id: None,
            gateway_response: None,
            notes: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Pending, overdue or with an intent in flight
    pub fn is_outstanding(&self) -> bool {
        matches!(
            self.status,
            EmiStatus::Pending | EmiStatus::Overdue | EmiStatus::Processing
        )
    }

    /// Candidates for the "earliest open installment" fallback
    pub fn is_open(&self) -> bool {
        matches!(self.status, EmiStatus::Pending | EmiStatus::Overdue)
    }

    /// All three pieces of settlement evidence are present
    pub fn has_settlement_evidence(&self) -> bool {
        self.paid_date.is_some()
            && self
                .transaction_id
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty())
            && self
                .gateway_payment_id
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty())
    }

    /// Move to `paid`, writing the whole settlement at once
    pub fn mark_paid(
        &mut self,
        settlement: &Settlement,
        method: PaymentMethod,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status == EmiStatus::Cancelled {
            return Err(AppError::invalid_state(
                format!("Installment {} is cancelled", self.id),
                self.status,
            ));
        }

        self.paid_date = Some(settlement.paid_date());
        self.transaction_id = Some(settlement.transaction_id().to_string());
        self.gateway_payment_id = Some(settlement.gateway_payment_id().to_string());
        self.payment_method = Some(method);
        self.status = EmiStatus::Paid;
        self.updated_at = now;

        Ok(())
    }

    /// Back to `pending` with the settlement triple cleared
    pub fn reset_to_pending(&mut self, now: DateTime<Utc>) {
        self.status = EmiStatus::Pending;
        self.paid_date = None;
        self.transaction_id = None;
        self.gateway_payment_id = None;
        self.updated_at = now;
    }

    /// Record an intent in flight for this installment; a new intent replaces an older one
    pub fn mark_processing(&mut self, gateway_payment_id: String, now: DateTime<Utc>) -> Result<()> {
        if !self.is_outstanding() {
            return Err(AppError::invalid_state(
                format!("Installment {} cannot start a new charge", self.id),
                self.status,
            ));
        }

        self.status = EmiStatus::Processing;
        self.gateway_payment_id = Some(gateway_payment_id);
        self.updated_at = now;
        Ok(())
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status == EmiStatus::Paid {
            return Err(AppError::invalid_state(
                format!("Installment {} is already paid", self.id),
                self.status,
            ));
        }

        self.status = EmiStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }

    /// Flip a pending installment to `overdue` once its due date has passed.
    /// Returns true when the status changed.
    pub fn refresh_overdue(&mut self, today: NaiveDate, now: DateTime<Utc>) -> bool {
        if self.status == EmiStatus::Pending && today > self.due_date {
            self.status = EmiStatus::Overdue;
            self.updated_at = now;
            return true;
        }
        false
    }

    pub fn needs_receipt(&self) -> bool {
        self.status == EmiStatus::Paid && self.receipt_number.is_none()
    }
}

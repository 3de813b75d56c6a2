//! Ledger persistence ports
//!
//! Services receive the store as `Arc<dyn LedgerStore>`; the MySQL adapter
//! backs the running service and the in-memory adapter backs tests and dry
//! runs. Both honour the same `transact` contract:
//!
//! 1. lock the student row (serializing every write for that student),
//! 2. load the full [`StudentLedger`],
//! 3. run the caller's synchronous mutation,
//! 4. issue every invoice/receipt number the ledger is still missing,
//! 5. reject the write when [`StudentLedger::check_invariants`] fails,
//! 6. persist inserts, updates and cascaded deletes, then commit.
//!
//! An error at any step leaves the stored ledger untouched.

use async_trait::async_trait;

use crate::core::Result;
use crate::modules::ledger::models::{EmiPayment, Payment, Student, StudentLedger};

/// Mutation run inside a ledger transaction
pub type LedgerOp<'a> = dyn FnMut(&mut StudentLedger) -> Result<()> + Send + 'a;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_student(&self, student_id: &str) -> Result<Option<Student>>;

    async fn find_payment(&self, payment_id: &str) -> Result<Option<Payment>>;

    /// Most recent payment carrying this gateway intent id
    async fn find_payment_by_gateway_id(&self, gateway_payment_id: &str)
        -> Result<Option<Payment>>;

    /// Most recently created pending, partial or processing payment of a student
    async fn find_latest_open_payment(&self, student_id: &str) -> Result<Option<Payment>>;

    async fn find_emi_payment(&self, emi_payment_id: &str) -> Result<Option<EmiPayment>>;

    async fn find_emi_by_gateway_id(&self, gateway_payment_id: &str)
        -> Result<Option<EmiPayment>>;

    /// Earliest-due pending or overdue installment of a student
    async fn find_earliest_open_emi(&self, student_id: &str) -> Result<Option<EmiPayment>>;

    async fn list_student_ids(&self) -> Result<Vec<String>>;

    /// Read-only snapshot of a student's ledger; `NotFound` when the student is unknown
    async fn load_ledger(&self, student_id: &str) -> Result<StudentLedger>;

    async fn insert_student(&self, student: &Student) -> Result<()>;

    /// Run `op` against the student's ledger as one all-or-nothing write
    async fn transact(&self, student_id: &str, op: &mut LedgerOp<'_>) -> Result<StudentLedger>;
}

/// Monotonic document numbering
#[async_trait]
pub trait SequenceGenerator: Send + Sync {
    /// Next number for `prefix`, e.g. `RCP000042`
    async fn next(&self, prefix: &str) -> Result<String>;
}

/// Render a counter value as `PREFIX######`
pub fn format_sequence(prefix: &str, value: u64) -> String {
    format!("{}{:06}", prefix, value)
}

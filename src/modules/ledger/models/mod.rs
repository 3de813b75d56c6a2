pub mod emi_payment;
pub mod payment;
pub mod student;
pub mod student_ledger;

pub use emi_payment::{EmiPayment, EmiStatus, Settlement};
pub use payment::{GatewayProvider, Payment, PaymentMethod, PaymentStatus};
pub use student::{EnrollmentStatus, FeeStatus, Student, StudentBalance};
pub use student_ledger::{NumberSlot, StudentLedger};

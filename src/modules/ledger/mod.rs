pub mod models;
pub mod repositories;

pub use models::{
    EmiPayment, EmiStatus, EnrollmentStatus, FeeStatus, GatewayProvider, NumberSlot, Payment,
    PaymentMethod, PaymentStatus, Settlement, Student, StudentBalance, StudentLedger,
};
pub use repositories::{
    LedgerOp, LedgerStore, MemoryLedgerStore, MySqlLedgerStore, MySqlSequenceGenerator,
    SequenceGenerator,
};

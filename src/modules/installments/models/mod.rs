pub mod payment_request;

pub use payment_request::{
    CreatePaymentRequest, PlannedPayment, ScheduledInstallment, MAX_INSTALLMENTS,
};

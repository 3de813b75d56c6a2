pub mod controllers;
pub mod models;
pub mod services;

pub use models::{CreatePaymentRequest, PlannedPayment, ScheduledInstallment};
pub use services::{InstallmentCalculator, PaymentPlanner};

pub mod services;

pub use services::{PaymentNotifier, TracingNotifier};

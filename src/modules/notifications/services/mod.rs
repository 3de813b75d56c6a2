pub mod payment_notifier;

pub use payment_notifier::{PaymentNotifier, TracingNotifier};

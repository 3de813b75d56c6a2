//! Fee ledger and payment reconciliation service.
//!
//! Tracks student fee payments and their installments, collects money
//! through a payment gateway and reconciles gateway events back into the
//! ledger with the student's balance kept consistent.

pub mod app_state;
pub mod cli;
pub mod config;
pub mod core;
pub mod middleware;
pub mod modules;

pub use app_state::AppState;
pub use modules::gateways;
pub use modules::installments;
pub use modules::ledger;
pub use modules::reconciliation;

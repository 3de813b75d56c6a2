pub mod ledger_controller;
pub mod webhook_controller;

pub use ledger_controller::{
    cancel_emi_payment, confirm_payment, delete_payment, recompute_balance, update_payment_status,
};
pub use webhook_controller::{stripe_webhook, STRIPE_SIGNATURE_HEADER};

use actix_web::web;

/// Configure every reconciliation route
pub fn configure(cfg: &mut web::ServiceConfig) {
    webhook_controller::configure(cfg);
    ledger_controller::configure(cfg);
}

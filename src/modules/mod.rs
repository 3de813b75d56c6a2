pub mod gateways;
pub mod health;
pub mod installments;
pub mod ledger;
pub mod notifications;
pub mod reconciliation;

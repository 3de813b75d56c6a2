pub mod controllers;
pub mod models;
pub mod services;

pub use models::{
    Disposition, ManualConfirmation, PaymentClassification, PaymentEvent, ReconciliationOutcome,
    WebhookAck,
};
pub use services::{
    BalanceAggregator, LedgerRepair, LedgerResolver, ReconciliationEngine, ReconciliationService,
    RepairReport,
};

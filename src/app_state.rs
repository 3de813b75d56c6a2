use actix_web::web;
use std::sync::Arc;

use crate::core::Currency;
use crate::modules::gateways::services::{IntentService, PaymentGateway};
use crate::modules::health;
use crate::modules::installments::services::PaymentPlanner;
use crate::modules::ledger::LedgerStore;
use crate::modules::notifications::PaymentNotifier;
use crate::modules::reconciliation::services::{LedgerRepair, ReconciliationService};
use crate::modules::{gateways, installments, reconciliation};

/// Services shared by every HTTP worker and CLI command
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn LedgerStore>,
    pub planner: Arc<PaymentPlanner>,
    pub intents: Arc<IntentService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub repair: Arc<LedgerRepair>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn PaymentNotifier>,
        webhook_secret: impl Into<String>,
        default_currency: Currency,
    ) -> Self {
        Self {
            planner: Arc::new(PaymentPlanner::new(store.clone(), default_currency)),
            intents: Arc::new(IntentService::new(store.clone(), gateway.clone())),
            reconciliation: Arc::new(ReconciliationService::new(
                store.clone(),
                gateway,
                notifier,
                webhook_secret,
            )),
            repair: Arc::new(LedgerRepair::new(store.clone())),
            store,
        }
    }

    /// Register service data and every route
    pub fn configure(&self, cfg: &mut web::ServiceConfig) {
        cfg.app_data(web::Data::new(self.planner.clone()))
            .app_data(web::Data::new(self.intents.clone()))
            .app_data(web::Data::new(self.reconciliation.clone()));

        health::configure(cfg);
        installments::controllers::configure(cfg);
        gateways::controllers::configure(cfg);
        reconciliation::controllers::configure(cfg);
    }
}

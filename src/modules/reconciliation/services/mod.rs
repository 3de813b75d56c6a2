pub mod balance_aggregator;
pub mod ledger_repair;
pub mod reconciliation_engine;
pub mod reconciliation_service;
pub mod resolver;

pub use balance_aggregator::BalanceAggregator;
pub use ledger_repair::{LedgerRepair, RepairFailure, RepairReport, StudentRepair};
pub use reconciliation_engine::{EngineOutcome, ReconciliationEngine};
pub use reconciliation_service::ReconciliationService;
pub use resolver::{LedgerResolver, ResolvedTarget};

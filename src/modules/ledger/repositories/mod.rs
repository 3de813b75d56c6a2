pub mod ledger_store;
pub mod memory_ledger_store;
pub mod mysql_ledger_store;

pub use ledger_store::{format_sequence, LedgerOp, LedgerStore, SequenceGenerator};
pub use memory_ledger_store::MemoryLedgerStore;
pub use mysql_ledger_store::{MySqlLedgerStore, MySqlSequenceGenerator};

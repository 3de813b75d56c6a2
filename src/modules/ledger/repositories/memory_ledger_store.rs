use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use super::ledger_store::{format_sequence, LedgerOp, LedgerStore, SequenceGenerator};
use crate::core::{AppError, Result};
use crate::modules::ledger::models::{EmiPayment, Payment, Student, StudentLedger};

#[derive(Debug, Default, Clone)]
struct MemoryState {
    ledgers: BTreeMap<String, StudentLedger>,
    counters: HashMap<String, u64>,
}

impl MemoryState {
    fn next_number(counters: &mut HashMap<String, u64>, prefix: &str) -> String {
        let value = counters.entry(prefix.to_string()).or_insert(0);
        *value += 1;
        format_sequence(prefix, *value)
    }

    fn payments(&self) -> impl Iterator<Item = &Payment> {
        self.ledgers.values().flat_map(|l| l.payments.iter())
    }

    fn emis(&self) -> impl Iterator<Item = &EmiPayment> {
        self.ledgers.values().flat_map(|l| l.emi_payments.iter())
    }
}

/// In-process ledger store.
///
/// A single async mutex serializes every transaction; each `transact` works on
/// a clone of the ledger and the counters and swaps them in only after the
/// invariant check passes.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a complete ledger as-is, bypassing the invariant check
    pub async fn seed_ledger(&self, ledger: StudentLedger) {
        let mut state = self.state.lock().await;
        state.ledgers.insert(ledger.student.id.clone(), ledger);
    }

    /// Copy of the whole store, used for dry runs
    pub async fn fork(&self) -> Self {
        let state = self.state.lock().await.clone();
        Self {
            state: Mutex::new(state),
        }
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn find_student(&self, student_id: &str) -> Result<Option<Student>> {
        let state = self.state.lock().await;
        let student = state.ledgers.get(student_id).map(|l| l.student.clone());
        Ok(student)
    }

    async fn find_payment(&self, payment_id: &str) -> Result<Option<Payment>> {
        let state = self.state.lock().await;
        let payment = state.payments().find(|p| p.id == payment_id).cloned();
        Ok(payment)
    }

    async fn find_payment_by_gateway_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<Payment>> {
        let state = self.state.lock().await;
        let payment = state
            .payments()
            .filter(|p| p.gateway_payment_id.as_deref() == Some(gateway_payment_id))
            .max_by_key(|p| p.created_at)
            .cloned();
        Ok(payment)
    }

    async fn find_latest_open_payment(&self, student_id: &str) -> Result<Option<Payment>> {
        let state = self.state.lock().await;
        let payment = state
            .ledgers
            .get(student_id)
            .and_then(|l| l.latest_open_payment().cloned());
        Ok(payment)
    }

    async fn find_emi_payment(&self, emi_payment_id: &str) -> Result<Option<EmiPayment>> {
        let state = self.state.lock().await;
        let emi = state.emis().find(|e| e.id == emi_payment_id).cloned();
        Ok(emi)
    }

    async fn find_emi_by_gateway_id(
        &self,
        gateway_payment_id: &str,
    ) -> Result<Option<EmiPayment>> {
        let state = self.state.lock().await;
        let emi = state
            .emis()
            .filter(|e| e.gateway_payment_id.as_deref() == Some(gateway_payment_id))
            .max_by_key(|e| e.updated_at)
            .cloned();
        Ok(emi)
    }

    async fn find_earliest_open_emi(&self, student_id: &str) -> Result<Option<EmiPayment>> {
        let state = self.state.lock().await;
        let emi = state
            .ledgers
            .get(student_id)
            .and_then(|l| l.earliest_open_emi().cloned());
        Ok(emi)
    }

    async fn list_student_ids(&self) -> Result<Vec<String>> {
        let state = self.state.lock().await;
        let student_ids = state.ledgers.keys().cloned().collect();
        Ok(student_ids)
    }

    async fn load_ledger(&self, student_id: &str) -> Result<StudentLedger> {
        let state = self.state.lock().await;
        let ledger = state.ledgers.get(student_id).cloned();
        ledger.ok_or_else(|| AppError::not_found("Student", format!("studentId={}", student_id)))
    }

    async fn insert_student(&self, student: &Student) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.ledgers.contains_key(&student.id) {
            return Err(AppError::validation(format!(
                "Student {} already exists",
                student.id
            )));
        }
        state.ledgers.insert(
            student.id.clone(),
            StudentLedger::new(student.clone(), Vec::new(), Vec::new()),
        );
        Ok(())
    }

    async fn transact(&self, student_id: &str, op: &mut LedgerOp<'_>) -> Result<StudentLedger> {
        let mut state = self.state.lock().await;

        let mut ledger = state
            .ledgers
            .get(student_id)
            .cloned()
            .ok_or_else(|| AppError::not_found("Student", format!("studentId={}", student_id)))?;
        let mut counters = state.counters.clone();

        op(&mut ledger)?;

        for slot in ledger.missing_numbers() {
            let number = MemoryState::next_number(&mut counters, slot.prefix());
            ledger.assign_number(&slot, number)?;
        }

        ledger.check_invariants()?;

        state.ledgers.insert(student_id.to_string(), ledger.clone());
        state.counters = counters;

        Ok(ledger)
    }
}

#[async_trait]
impl SequenceGenerator for MemoryLedgerStore {
    async fn next(&self, prefix: &str) -> Result<String> {
        let mut state = self.state.lock().await;
        Ok(MemoryState::next_number(&mut state.counters, prefix))
    }
}

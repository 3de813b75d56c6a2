// Wires the services over a fresh in-memory store.

use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;

use feeledger::core::Currency;
use feeledger::installments::PlannedPayment;
use feeledger::ledger::models::Student;
use feeledger::ledger::{LedgerStore, MemoryLedgerStore};
use feeledger::modules::notifications::TracingNotifier;
use feeledger::AppState;

use super::fake_gateway::{ScriptedGateway, WEBHOOK_SECRET};
use super::test_data::TestDataFactory;

pub struct TestContext {
    pub store: Arc<MemoryLedgerStore>,
    pub gateway: Arc<ScriptedGateway>,
    pub state: AppState,
}

impl TestContext {
    pub fn new() -> Self {
        let store = Arc::new(MemoryLedgerStore::new());
        let gateway = Arc::new(ScriptedGateway::new());
        let state = AppState::new(
            store.clone(),
            gateway.clone(),
            Arc::new(TracingNotifier),
            WEBHOOK_SECRET,
            Currency::INR,
        );
        Self {
            store,
            gateway,
            state,
        }
    }

    /// Insert a student with no fees registered
    pub async fn add_student(&self, id: &str) -> Student {
        let student = Student::new(id, "Test Student", Utc::now());
        self.store
            .insert_student(&student)
            .await
            .expect("insert student");
        student
    }

    /// Insert a student whose total fees are already set
    pub async fn add_student_with_fees(&self, id: &str, total_fees: Decimal) -> Student {
        let student = Student::new(id, "Test Student", Utc::now()).with_total_fees(total_fees);
        self.store
            .insert_student(&student)
            .await
            .expect("insert student");
        student
    }

    /// New student with one payment planned through the planner
    pub async fn student_with_plan(
        &self,
        total_amount: Decimal,
        deposit_amount: Decimal,
        installment_count: Option<i32>,
    ) -> (String, PlannedPayment) {
        let student_id = TestDataFactory::random_student_id();
        self.add_student(&student_id).await;
        let planned = self
            .state
            .planner
            .create_payment(TestDataFactory::payment_request(
                &student_id,
                total_amount,
                deposit_amount,
                installment_count,
            ))
            .await
            .expect("create payment");
        (student_id, planned)
    }
}

pub mod installment_calculator;
pub mod payment_planner;

pub use installment_calculator::InstallmentCalculator;
pub use payment_planner::PaymentPlanner;

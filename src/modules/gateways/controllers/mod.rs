pub mod intent_controller;

pub use intent_controller::{configure, create_emi_payment_intent, create_payment_intent};

// Test helpers shared by the integration suites.
//
// Services run against the in-memory ledger store and a scripted gateway
// that still verifies webhook signatures the way the real one does.
//
// Usage (from a test file):
//   #[path = "../helpers/mod.rs"]
//   mod helpers;
//   use helpers::*;
#![allow(dead_code)]

pub mod context;
pub mod fake_gateway;
pub mod test_data;

pub use context::*;
pub use fake_gateway::*;
pub use test_data::*;

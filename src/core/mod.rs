pub mod currency;
pub mod error;
pub mod telemetry;

pub use currency::{Currency, AMOUNT_TOLERANCE};
pub use error::{AppError, Result};

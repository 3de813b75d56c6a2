pub mod payment_event;

pub use payment_event::{
    Disposition, EventMetadata, ManualConfirmation, PaymentClassification, PaymentEvent,
    ReconciliationOutcome, ReconciliationTarget, WebhookAck,
};

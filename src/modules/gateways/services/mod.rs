pub mod gateway_trait;
pub mod intent_service;
pub mod stripe;

pub use gateway_trait::{
    CreatedIntent, GatewayEvent, GatewayEventKind, GatewayIntent, IntentStatus, PaymentGateway,
    META_EMI_PAYMENT_ID, META_PAYMENT_ID, META_STUDENT_ID,
};
pub use intent_service::{IntentResponse, IntentService};
pub use stripe::{parse_stripe_event, verify_stripe_signature, StripeGateway};

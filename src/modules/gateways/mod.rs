pub mod controllers;
pub mod services;

pub use controllers::{create_emi_payment_intent, create_payment_intent};
pub use services::{
    GatewayEvent, GatewayEventKind, GatewayIntent, IntentService, IntentStatus, PaymentGateway,
    StripeGateway,
};

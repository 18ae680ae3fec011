pub mod billing_service;
pub mod paystack;
pub mod plans;

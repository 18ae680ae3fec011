pub mod checkout;
pub mod health;
pub mod plans;
pub mod subscription;
pub mod webhook;

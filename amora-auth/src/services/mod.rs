pub mod auth_service;
pub mod reset_flow;
pub mod token_service;

pub mod api_errors;
pub mod escrow_api;
pub mod webhook;

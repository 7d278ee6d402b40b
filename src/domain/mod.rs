pub mod audit;
pub mod error;
pub mod escrow;
pub mod id;
pub mod money;
pub mod notification;
pub mod payment;
pub mod payout;
pub mod policy;
pub mod ports;
pub mod webhook;

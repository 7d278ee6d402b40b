pub mod escrow_manager;
pub mod reconciliation;
pub mod side_effects;
pub mod signature;

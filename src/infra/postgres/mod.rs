pub mod audit_repo;
pub mod escrow_repo;
pub mod payment_repo;

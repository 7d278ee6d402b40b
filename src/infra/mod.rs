pub mod memory;
pub mod outbound;
pub mod postgres;

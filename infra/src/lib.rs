pub mod ids;
pub mod memory;
pub mod persistence;

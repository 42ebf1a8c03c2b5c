pub mod mutations;
pub mod processing;
pub mod registry;

//! End-to-end tests: the real client against an in-process server

pub mod loopback;
pub mod test_context;

// Test scenario modules
mod delete_operations;
mod directory_operations;
mod file_operations;
mod scenarios;

pub use test_context::TestContext;

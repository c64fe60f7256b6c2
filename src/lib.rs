// Library module for ferry
// Re-exports modules for use in integration tests and the binary

pub mod error;
pub mod fs;
pub mod sync;

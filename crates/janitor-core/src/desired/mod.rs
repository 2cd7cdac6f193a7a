// # Desired State Source Implementations
//
// This module provides implementations of the DesiredStateSource trait for
// different places the source of truth can live.

pub mod file;
pub mod memory;

pub use file::FileDesiredStateSource;
pub use memory::MemoryDesiredStateSource;

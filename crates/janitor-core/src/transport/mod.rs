// # Change Transport Implementations

pub mod memory;

pub use memory::{MemoryTransport, ACK_HISTORY};

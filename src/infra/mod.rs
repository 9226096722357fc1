//! Concrete implementations of the service contracts.

pub mod memory;
pub mod memory_queue;
pub mod tfl;

pub use memory::MemoryDatastore;
pub use memory_queue::MemoryQueue;
pub use tfl::TflClient;

//! Pluggable persistence for outbox payloads.
//!
//! The queue keeps large or binary payloads out of its own state by writing
//! them through a [`PayloadStore`]. Two implementations ship here: an
//! in-memory map and a directory of JSON files.

mod error;
mod file;
mod memory;
mod traits;

pub use error::{StorageError, StorageResult};
pub use file::FileStore;
pub use memory::MemoryStore;
pub use traits::PayloadStore;

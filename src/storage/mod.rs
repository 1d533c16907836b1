mod kv;
mod memory;
mod sqlite;

pub use kv::{KeyValueStore, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

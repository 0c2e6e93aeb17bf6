// Project persistence
// Saving and restoring compositions through an injected record store

pub mod manager;
pub mod store;
pub mod types;

pub use manager::{LoadReport, ProjectError, ProjectManager};
pub use store::{MemoryStore, RecordId, Store, StoreError};

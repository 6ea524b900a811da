pub mod database;
pub mod documents;

pub use database::{Database, PoolConfig, SharedDatabase};
pub use documents::{DocumentKey, DocumentRecord, DocumentStore, PublishStatus};

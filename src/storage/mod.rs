pub mod sqlite;
pub mod trait_def;

pub use sqlite::{SqliteQuery, SqliteStorage};
pub use trait_def::{RequestStorage, StorageError, StorageResult};

pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{ItemQuery, Storage, StorageRead, StorageTx, StorageWrite};

pub mod storage;
pub mod store;

pub use storage::{KvStorage, MemoryStorage, SqliteStorage};
pub use store::{CourseStore, LoadedSnapshot, Metadata, SaveBatch};

// Completed-match history persistence
// MessagePack + LZ4 compression with versioning and integrity checks

pub mod error;
pub mod format;
pub mod migration;
pub mod store;

pub use error::SaveError;
pub use format::{decompress_and_deserialize, serialize_and_compress, HistoryFile};
pub use migration::migrate_history;
pub use store::{FileMatchHistoryStore, InMemoryMatchHistoryStore, MatchHistoryStore};

pub const HISTORY_VERSION: u32 = 1;

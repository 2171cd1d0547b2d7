pub mod memory;
pub mod qdrant;
pub mod sqlite;
pub mod vector;

pub use memory::MemoryIndex;
pub use qdrant::QdrantStorage;
pub use sqlite::SqliteStorage;
pub use vector::{ChunkFilter, ChunkMetadata, IndexStats, VectorIndex, VectorMatch, VectorRecord};

use crate::error::StoreError;
use crate::models::{ChunkRecord, ScoredChunk};
use async_trait::async_trait;

pub const DEFAULT_TOP_K: usize = 3;

/// Persistence and nearest-neighbor search over chunk records. Embedding
/// happens behind this seam; callers hand over text only.
#[async_trait]
pub trait VectorIndex {
    /// Stores (text, embedding, metadata) under `record.id`, replacing any
    /// existing entry with the same id.
    async fn upsert(&self, record: &ChunkRecord) -> Result<(), StoreError>;

    /// Returns up to `top_k` entries nearest to `query`, ascending by
    /// distance (best match first).
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, StoreError>;

    /// Drops every stored entry. Used by full corpus rebuilds.
    async fn clear(&self) -> Result<(), StoreError>;
}

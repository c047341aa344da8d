use crate::embeddings::Embedder;
use crate::error::StoreError;
use crate::models::{ChunkMetadata, ChunkRecord, ScoredChunk};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::warn;

const RECORDS_FILE: &str = "records.jsonl";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredRecord {
    id: String,
    text: String,
    embedding: Vec<f32>,
    metadata: ChunkMetadata,
}

#[derive(Default)]
struct StoreState {
    records: Vec<Option<StoredRecord>>,
    id_map: HashMap<String, usize>,
    dimension: Option<usize>,
}

impl StoreState {
    /// Insert-or-replace keyed by id. Replacement keeps the original slot so
    /// result ordering stays deterministic across reloads.
    fn insert(&mut self, record: StoredRecord) -> Result<(), StoreError> {
        let dimension = record.embedding.len();
        match self.dimension {
            Some(expected) if expected != dimension => {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    got: dimension,
                });
            }
            None => self.dimension = Some(dimension),
            _ => {}
        }

        if let Some(&index) = self.id_map.get(&record.id) {
            self.records[index] = Some(record);
        } else {
            self.id_map.insert(record.id.clone(), self.records.len());
            self.records.push(Some(record));
        }

        Ok(())
    }
}

/// File-backed vector store owning its embedding function. State lives in a
/// persist directory as an append-only record log; later lines supersede
/// earlier ones with the same id, so every write is durable without an
/// explicit flush. The log is loaded lazily on first use.
pub struct LocalVectorStore<E: Embedder> {
    persist_dir: PathBuf,
    embedder: E,
    state: RwLock<Option<StoreState>>,
}

impl<E: Embedder> LocalVectorStore<E> {
    pub fn new(persist_dir: impl Into<PathBuf>, embedder: E) -> Self {
        Self {
            persist_dir: persist_dir.into(),
            embedder,
            state: RwLock::new(None),
        }
    }

    fn records_path(&self) -> PathBuf {
        self.persist_dir.join(RECORDS_FILE)
    }

    async fn ensure_loaded(&self) -> Result<(), StoreError> {
        {
            let state = self.state.read().await;
            if state.is_some() {
                return Ok(());
            }
        }

        let mut state = self.state.write().await;
        if state.is_some() {
            return Ok(());
        }

        *state = Some(load_state(&self.records_path()).await?);
        Ok(())
    }

    async fn append_record(&self, record: &StoredRecord) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.persist_dir).await?;
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.records_path())
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }
}

async fn load_state(path: &Path) -> Result<StoreState, StoreError> {
    let mut state = StoreState::default();

    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(state),
        Err(error) => return Err(StoreError::Io(error)),
    };

    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<StoredRecord>(line) {
            Ok(record) => state.insert(record)?,
            Err(error) => {
                warn!(path = %path.display(), %error, "skipping malformed record line");
            }
        }
    }

    Ok(state)
}

#[async_trait]
impl<E: Embedder> VectorIndex for LocalVectorStore<E> {
    async fn upsert(&self, record: &ChunkRecord) -> Result<(), StoreError> {
        self.ensure_loaded().await?;
        let embedding = self.embedder.embed(&record.text).await?;

        let stored = StoredRecord {
            id: record.id.clone(),
            text: record.text.clone(),
            embedding,
            metadata: record.metadata.clone(),
        };

        {
            let mut guard = self.state.write().await;
            let Some(state) = guard.as_mut() else {
                return Err(StoreError::NotReady("store state dropped".to_string()));
            };
            state.insert(stored.clone())?;
        }

        self.append_record(&stored).await
    }

    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        self.ensure_loaded().await?;
        let query_embedding = self.embedder.embed(query).await?;

        let state = self.state.read().await;
        let Some(state) = state.as_ref() else {
            return Err(StoreError::NotReady("store state dropped".to_string()));
        };

        if let Some(expected) = state.dimension {
            if expected != query_embedding.len() {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    got: query_embedding.len(),
                });
            }
        }

        let mut hits: Vec<ScoredChunk> = state
            .records
            .iter()
            .flatten()
            .map(|record| ScoredChunk {
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                score: cosine_distance(&query_embedding, &record.embedding),
            })
            .collect();

        hits.sort_by(|left, right| left.score.total_cmp(&right.score));
        hits.truncate(top_k);
        Ok(hits)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        *state = Some(StoreState::default());

        tokio::fs::create_dir_all(&self.persist_dir).await?;
        tokio::fs::write(self.records_path(), b"").await?;
        Ok(())
    }
}

/// Distance form of cosine similarity: 0 for identical direction, growing as
/// vectors diverge, so ascending sort puts the best match first.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

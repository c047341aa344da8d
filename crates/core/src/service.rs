use crate::engine::AnswerEngine;
use crate::error::IngestError;
use crate::ingest::{IngestionPipeline, IngestionReport};
use crate::llm::LanguageModel;
use crate::models::{Answer, IngestionOptions};
use crate::ocr::OcrEngine;
use crate::traits::VectorIndex;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Front door for callers: one shared index handle wired into both the
/// ingestion pipeline and the answer engine, plus a gate that serializes full
/// rebuilds against in-flight queries. A query issued during a rebuild blocks
/// until the rebuild finishes instead of reading a half-built index.
pub struct QaService<S, O, L> {
    pipeline: IngestionPipeline<S, O>,
    engine: AnswerEngine<S, L>,
    rebuild_gate: RwLock<()>,
}

impl<S, O, L> QaService<S, O, L>
where
    S: VectorIndex + Send + Sync,
    O: OcrEngine,
    L: LanguageModel,
{
    pub fn new(index: Arc<S>, ocr: O, llm: L, options: IngestionOptions, top_k: usize) -> Self {
        Self {
            pipeline: IngestionPipeline::new(Arc::clone(&index), ocr, options),
            engine: AnswerEngine::new(index, llm, top_k),
            rebuild_gate: RwLock::new(()),
        }
    }

    /// Full corpus rebuild, exclusive against queries and other rebuilds.
    pub async fn rebuild(&self, folder: &Path) -> Result<IngestionReport, IngestError> {
        let _exclusive = self.rebuild_gate.write().await;
        self.pipeline.rebuild_folder(folder).await
    }

    /// Adds a folder's documents to the existing index without clearing it.
    pub async fn ingest(&self, folder: &Path) -> Result<IngestionReport, IngestError> {
        let _exclusive = self.rebuild_gate.write().await;
        self.pipeline.ingest_folder(folder).await
    }

    pub async fn answer(&self, question: &str) -> Answer {
        let _shared = self.rebuild_gate.read().await;
        self.engine.answer(question).await
    }
}

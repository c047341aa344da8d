pub mod embeddings;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod images;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod service;
pub mod splitter;
pub mod stores;
pub mod traits;
pub mod watcher;

pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use engine::AnswerEngine;
pub use error::{GenerationError, IngestError, StoreError};
pub use extractor::{detect_kind, extract_text, DocumentKind};
pub use images::{extract_document_images, ImageOutcome};
pub use ingest::{
    build_chunk_records, discover_documents, IngestionPipeline, IngestionReport, SkippedDocument,
};
pub use llm::{LanguageModel, OllamaClient};
pub use models::{
    decode_images, dedup_images, encode_images, sort_images, Answer, AnswerImage, ChunkMetadata,
    ChunkRecord, DocumentImage, IngestionOptions, ScoredChunk,
};
pub use ocr::{DisabledOcr, HttpOcrClient, OcrEngine};
pub use service::QaService;
pub use splitter::{split_text, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE};
pub use stores::LocalVectorStore;
pub use traits::{VectorIndex, DEFAULT_TOP_K};
pub use watcher::{snapshot_folder, FolderWatcher};

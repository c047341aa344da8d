use chrono::Utc;
use clap::{Parser, Subcommand};
use docqa_core::{
    CharacterNgramEmbedder, DisabledOcr, Embedder, FolderWatcher, HttpOcrClient, IngestionOptions,
    IngestionReport, LocalVectorStore, OcrEngine, OllamaClient, OllamaEmbedder, QaService,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docqa", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory holding the persisted vector index
    #[arg(long, env = "DOCQA_INDEX_DIR", default_value = "index_db")]
    index_dir: PathBuf,

    /// Directory where extracted screenshots are written
    #[arg(long, env = "DOCQA_MEDIA_DIR", default_value = "media")]
    media_dir: PathBuf,

    /// Base URL of the Ollama server used for generation (and embeddings)
    #[arg(long, env = "DOCQA_OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Generation model name
    #[arg(long, env = "DOCQA_GENERATION_MODEL", default_value = "llama3:8b-instruct-q4_K_M")]
    generation_model: String,

    /// Embedding model name; without it a local deterministic embedder is used
    #[arg(long, env = "DOCQA_EMBEDDING_MODEL")]
    embedding_model: Option<String>,

    /// Vector size of the embedding model
    #[arg(long, env = "DOCQA_EMBEDDING_DIMENSIONS", default_value = "768")]
    embedding_dimensions: usize,

    /// HTTP OCR endpoint; without it screenshots are indexed without OCR text
    #[arg(long, env = "DOCQA_OCR_URL")]
    ocr_url: Option<String>,

    /// Bearer key for the OCR endpoint
    #[arg(long, env = "DOCQA_OCR_API_KEY")]
    ocr_api_key: Option<String>,

    /// OCR language hints, comma separated
    #[arg(long, env = "DOCQA_OCR_LANGUAGES", default_value = "eng,rus")]
    ocr_languages: String,

    /// Number of chunks retrieved per question
    #[arg(long, env = "DOCQA_TOP_K", default_value_t = docqa_core::DEFAULT_TOP_K)]
    top_k: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Rebuild the index from every supported document in a folder.
    Ingest {
        /// Folder that contains PDF/DOCX manuals (scanned non-recursively).
        #[arg(long)]
        folder: PathBuf,
        /// Add to the existing index instead of rebuilding it.
        #[arg(long, default_value_t = false)]
        append: bool,
    },
    /// Ask a question and print the structured answer as JSON.
    Ask {
        #[arg(long)]
        question: String,
    },
    /// Rebuild once, then watch the folder and rebuild on changes.
    Watch {
        #[arg(long)]
        folder: PathBuf,
        /// Seconds between folder scans.
        #[arg(long, default_value = "2")]
        poll_secs: u64,
        /// Quiet seconds required before a rebuild starts.
        #[arg(long, default_value = "1")]
        debounce_secs: u64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let embedder: Box<dyn Embedder> = match &cli.embedding_model {
        Some(model) => Box::new(OllamaEmbedder::new(
            cli.ollama_url.clone(),
            model.clone(),
            cli.embedding_dimensions,
        )),
        None => Box::new(CharacterNgramEmbedder::default()),
    };
    let index = Arc::new(LocalVectorStore::new(cli.index_dir.clone(), embedder));

    let ocr: Box<dyn OcrEngine> = match &cli.ocr_url {
        Some(url) => Box::new(HttpOcrClient::new(url.clone(), cli.ocr_api_key.clone())?),
        None => Box::new(DisabledOcr),
    };

    let llm = OllamaClient::new(cli.ollama_url.clone(), cli.generation_model.clone())?;

    let options = IngestionOptions {
        chunk_size: DEFAULT_CHUNK_SIZE,
        chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        media_dir: cli.media_dir.clone(),
        ocr_languages: cli
            .ocr_languages
            .split(',')
            .map(|language| language.trim().to_string())
            .filter(|language| !language.is_empty())
            .collect(),
    };

    let service = QaService::new(index, ocr, llm, options, cli.top_k);
    info!(version = env!("CARGO_PKG_VERSION"), started_at = %Utc::now().to_rfc3339(), "docqa boot");

    match cli.command {
        Command::Ingest { folder, append } => {
            let report = if append {
                service.ingest(&folder).await?
            } else {
                service.rebuild(&folder).await?
            };
            print_report(&report);
        }
        Command::Ask { question } => {
            let answer = service.answer(&question).await;
            println!("{}", serde_json::to_string_pretty(&answer)?);
        }
        Command::Watch {
            folder,
            poll_secs,
            debounce_secs,
        } => {
            let report = service.rebuild(&folder).await?;
            print_report(&report);

            let watcher = FolderWatcher::new(folder.clone()).with_intervals(
                Duration::from_secs(poll_secs),
                Duration::from_secs(debounce_secs),
            );
            watcher.run(&service).await?;
        }
    }

    Ok(())
}

fn print_report(report: &IngestionReport) {
    if !report.skipped.is_empty() {
        warn!(skipped = report.skipped.len(), "some documents were skipped");
        for skipped in &report.skipped {
            warn!(path = %skipped.path.display(), reason = %skipped.reason, "skipped document");
        }
    }

    println!(
        "{} documents, {} chunks, {} images ingested at {}",
        report.documents,
        report.chunks,
        report.images,
        Utc::now().to_rfc3339()
    );
}

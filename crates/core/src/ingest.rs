use crate::error::IngestError;
use crate::extractor::{detect_kind, extract_text, DocumentKind};
use crate::images::{extract_document_images, ImageOutcome};
use crate::models::{encode_images, ChunkMetadata, ChunkRecord, DocumentImage, IngestionOptions};
use crate::ocr::OcrEngine;
use crate::splitter::split_text;
use crate::traits::VectorIndex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Lists the supported documents of `folder`, non-recursively, in sorted
/// order. An inaccessible folder is an error; unsupported files are ignored.
pub fn discover_documents(folder: &Path) -> Result<Vec<PathBuf>, IngestError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|error| IngestError::FolderScan(error.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if detect_kind(entry.path()).is_some() {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    Ok(files)
}

#[derive(Debug)]
pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct IngestionReport {
    pub documents: usize,
    pub chunks: usize,
    pub images: usize,
    pub skipped: Vec<SkippedDocument>,
}

struct FileStats {
    chunks: usize,
    images: usize,
}

/// Builds the records for one document: stable `{filename}_chunk_{i}` ids and
/// the whole document's image list in every chunk's metadata.
pub fn build_chunk_records(
    filename: &str,
    source_path: &Path,
    text: &str,
    images: &[DocumentImage],
    options: &IngestionOptions,
) -> Result<Vec<ChunkRecord>, IngestError> {
    let encoded_images = encode_images(images)?;

    let records = split_text(text, options.chunk_size, options.chunk_overlap)
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| ChunkRecord {
            id: format!("{filename}_chunk_{index}"),
            text: chunk,
            metadata: ChunkMetadata {
                source: filename.to_string(),
                source_path: source_path.to_string_lossy().to_string(),
                images: encoded_images.clone(),
            },
        })
        .collect();

    Ok(records)
}

/// Turns a folder of manuals into indexed chunks. Holds its own handle to
/// the shared index; per-file failures are reported, never propagated.
pub struct IngestionPipeline<S, O> {
    index: Arc<S>,
    ocr: O,
    options: IngestionOptions,
}

impl<S, O> IngestionPipeline<S, O>
where
    S: VectorIndex + Send + Sync,
    O: OcrEngine,
{
    pub fn new(index: Arc<S>, ocr: O, options: IngestionOptions) -> Self {
        Self {
            index,
            ocr,
            options,
        }
    }

    pub fn options(&self) -> &IngestionOptions {
        &self.options
    }

    /// Ingests every supported document of `folder`. A document that fails to
    /// parse lands in the report's skipped list and the scan continues.
    pub async fn ingest_folder(&self, folder: &Path) -> Result<IngestionReport, IngestError> {
        let files = discover_documents(folder)?;
        info!(folder = %folder.display(), count = files.len(), "ingesting folder");

        let mut report = IngestionReport::default();
        for path in files {
            match self.ingest_file(&path).await {
                Ok(Some(stats)) => {
                    report.documents += 1;
                    report.chunks += stats.chunks;
                    report.images += stats.images;
                }
                Ok(None) => {
                    debug!(path = %path.display(), "document has no extractable text");
                }
                Err(error) => {
                    warn!(path = %path.display(), %error, "skipping document");
                    report.skipped.push(SkippedDocument {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    /// Full corpus rebuild: drops all indexed chunks and extracted media, then
    /// re-ingests. The recovery strategy after any detected change.
    pub async fn rebuild_folder(&self, folder: &Path) -> Result<IngestionReport, IngestError> {
        self.index.clear().await?;
        clear_media_dir(&self.options.media_dir)?;
        self.ingest_folder(folder).await
    }

    /// Returns `Ok(None)` for a document whose merged text is empty; such a
    /// file emits no chunks and is not an error.
    async fn ingest_file(&self, path: &Path) -> Result<Option<FileStats>, IngestError> {
        let Some(kind) = detect_kind(path) else {
            return Ok(None);
        };
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

        let body = extract_text(path, kind)?;
        let outcomes = extract_document_images(path, kind, &self.options, &self.ocr)?;

        let mut images = Vec::new();
        let mut skipped_images = 0usize;
        for outcome in outcomes {
            match outcome {
                ImageOutcome::Extracted(image) => images.push(image),
                ImageOutcome::Skipped { name, reason } => {
                    skipped_images += 1;
                    debug!(path = %path.display(), image = %name, %reason, "image skipped");
                }
            }
        }
        if skipped_images > 0 {
            warn!(path = %path.display(), skipped_images, "some embedded images were not extracted");
        }

        let full_text = merge_text(kind, body, &images);
        if full_text.trim().is_empty() {
            return Ok(None);
        }

        let records = build_chunk_records(filename, path, &full_text, &images, &self.options)?;
        for record in &records {
            self.index.upsert(record).await?;
        }

        Ok(Some(FileStats {
            chunks: records.len(),
            images: images.len(),
        }))
    }
}

/// PDF screenshots often carry the only machine-readable copy of dialog
/// labels, so their OCR text joins the body before splitting. DOCX body text
/// stands alone; its image text stays in metadata.
fn merge_text(kind: DocumentKind, body: String, images: &[DocumentImage]) -> String {
    match kind {
        DocumentKind::Pdf => {
            let ocr_block = images
                .iter()
                .map(|image| image.ocr_text.trim())
                .filter(|text| !text.is_empty())
                .collect::<Vec<_>>()
                .join("\n");

            if ocr_block.is_empty() {
                body
            } else {
                format!("{body}\n[Screenshot text]:\n{ocr_block}\n")
            }
        }
        DocumentKind::Docx => body,
    }
}

fn clear_media_dir(dir: &Path) -> Result<(), IngestError> {
    if dir.exists() {
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::CharacterNgramEmbedder;
    use crate::ocr::DisabledOcr;
    use crate::stores::LocalVectorStore;
    use std::collections::HashSet;
    use std::io::Write;
    use tempfile::tempdir;

    fn write_docx(path: &Path, paragraphs: &[&str]) {
        let file = std::fs::File::create(path).expect("create docx");
        let mut writer = zip::ZipWriter::new(file);
        writer
            .start_file("word/document.xml", zip::write::FileOptions::default())
            .expect("start document.xml");

        let mut xml = String::from("<w:document><w:body>");
        for paragraph in paragraphs {
            xml.push_str(&format!("<w:p><w:r><w:t>{paragraph}</w:t></w:r></w:p>"));
        }
        xml.push_str("</w:body></w:document>");
        writer.write_all(xml.as_bytes()).expect("write document.xml");
        writer.finish().expect("finish docx");
    }

    fn pipeline_in(
        dir: &Path,
    ) -> IngestionPipeline<LocalVectorStore<CharacterNgramEmbedder>, DisabledOcr> {
        let store = Arc::new(LocalVectorStore::new(
            dir.join("index"),
            CharacterNgramEmbedder::default(),
        ));
        let options = IngestionOptions {
            media_dir: dir.join("media"),
            ..IngestionOptions::default()
        };
        IngestionPipeline::new(store, DisabledOcr, options)
    }

    #[test]
    fn discovery_is_non_recursive_and_extension_filtered() {
        let dir = tempdir().expect("tempdir");
        std::fs::write(dir.path().join("a.pdf"), b"%PDF-1.4").expect("write");
        std::fs::write(dir.path().join("b.DOCX"), b"PK").expect("write");
        std::fs::write(dir.path().join("notes.txt"), b"ignored").expect("write");
        std::fs::create_dir(dir.path().join("nested")).expect("mkdir");
        std::fs::write(dir.path().join("nested/c.pdf"), b"%PDF-1.4").expect("write");

        let files = discover_documents(dir.path()).expect("discover");
        let names: Vec<_> = files
            .iter()
            .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
            .collect();
        assert_eq!(names, vec!["a.pdf", "b.DOCX"]);
    }

    #[test]
    fn discovery_of_a_missing_folder_is_an_error() {
        let dir = tempdir().expect("tempdir");
        let missing = dir.path().join("nowhere");
        assert!(discover_documents(&missing).is_err());
    }

    #[test]
    fn chunk_ids_are_unique_across_documents() {
        let options = IngestionOptions::default();
        let text_a = "Configure the proxy. ".repeat(60);
        let text_b = "Reset the password. ".repeat(60);

        let records_a = build_chunk_records(
            "a.pdf",
            Path::new("documents/a.pdf"),
            &text_a,
            &[],
            &options,
        )
        .expect("records");
        let records_b = build_chunk_records(
            "b.pdf",
            Path::new("documents/b.pdf"),
            &text_b,
            &[],
            &options,
        )
        .expect("records");

        assert!(records_a.len() > 1);
        let mut seen = HashSet::new();
        for record in records_a.iter().chain(records_b.iter()) {
            assert!(seen.insert(record.id.clone()), "duplicate id {}", record.id);
        }
        assert_eq!(records_a[0].id, "a.pdf_chunk_0");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn a_broken_document_does_not_stop_the_batch() {
        let dir = tempdir().expect("tempdir");
        let docs = dir.path().join("documents");
        std::fs::create_dir(&docs).expect("mkdir");

        std::fs::write(docs.join("broken.pdf"), b"%PDF-1.4 not really").expect("write");
        write_docx(
            &docs.join("manual.docx"),
            &["Press F12 to open the settings menu."],
        );

        let pipeline = pipeline_in(dir.path());
        let report = pipeline.ingest_folder(&docs).await.expect("ingest");

        assert_eq!(report.documents, 1);
        assert!(report.chunks >= 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].path.ends_with("broken.pdf"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn an_empty_document_is_skipped_without_error() {
        let dir = tempdir().expect("tempdir");
        let docs = dir.path().join("documents");
        std::fs::create_dir(&docs).expect("mkdir");
        write_docx(&docs.join("empty.docx"), &["   "]);

        let pipeline = pipeline_in(dir.path());
        let report = pipeline.ingest_folder(&docs).await.expect("ingest");

        assert_eq!(report.documents, 0);
        assert_eq!(report.chunks, 0);
        assert!(report.skipped.is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rebuild_clears_stale_media_files() {
        let dir = tempdir().expect("tempdir");
        let docs = dir.path().join("documents");
        std::fs::create_dir(&docs).expect("mkdir");
        write_docx(&docs.join("manual.docx"), &["Body text."]);

        let pipeline = pipeline_in(dir.path());
        let stale = pipeline.options().media_dir.join("old_img_0.jpg");
        std::fs::create_dir_all(&pipeline.options().media_dir).expect("mkdir media");
        std::fs::write(&stale, b"stale").expect("write stale");

        pipeline.rebuild_folder(&docs).await.expect("rebuild");
        assert!(!stale.exists());
    }
}

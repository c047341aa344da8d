use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One raster image extracted from a source document. Immutable once built;
/// chunk metadata references it by `img_path`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentImage {
    #[serde(default = "missing_page_num")]
    pub page_num: u32,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub img_path: String,
    #[serde(default)]
    pub caption: String,
    #[serde(default)]
    pub ocr_text: String,
}

/// Stored records that predate pagination carry no page number; they must
/// sort after every real page.
fn missing_page_num() -> u32 {
    999
}

/// Flat metadata attached to every chunk of a document. `images` holds the
/// whole document's image list in serialized form so it survives a flat
/// key-value metadata store.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChunkMetadata {
    pub source: String,
    pub source_path: String,
    #[serde(default)]
    pub images: String,
}

/// The unit written to the index: `{source_filename}_chunk_{index}` id, the
/// chunk text, and document-level metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// One retrieval hit. `score` is a distance: lower is more relevant.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// Wire shape of an answer image: just the path and a caption.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnswerImage {
    #[serde(default)]
    pub img_path: String,
    #[serde(default)]
    pub caption: String,
}

impl From<&DocumentImage> for AnswerImage {
    fn from(image: &DocumentImage) -> Self {
        Self {
            img_path: image.img_path.clone(),
            caption: image.caption.clone(),
        }
    }
}

/// The structured result of one question.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub images: Vec<AnswerImage>,
    pub source: String,
    pub link_to_document: String,
}

#[derive(Debug, Clone)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub media_dir: PathBuf,
    pub ocr_languages: Vec<String>,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 64,
            media_dir: PathBuf::from("media"),
            ocr_languages: vec!["eng".to_string(), "rus".to_string()],
        }
    }
}

/// Serialization boundary for the image list stored inside chunk metadata.
/// The pipeline passes typed records everywhere else.
pub fn encode_images(images: &[DocumentImage]) -> Result<String, serde_json::Error> {
    serde_json::to_string(images)
}

pub fn decode_images(raw: &str) -> Result<Vec<DocumentImage>, serde_json::Error> {
    serde_json::from_str(raw)
}

/// Drops repeated `img_path` entries, first occurrence wins. Entries without
/// a path are dropped outright.
pub fn dedup_images(images: Vec<DocumentImage>) -> Vec<DocumentImage> {
    let mut seen = std::collections::HashSet::new();
    images
        .into_iter()
        .filter(|image| !image.img_path.is_empty() && seen.insert(image.img_path.clone()))
        .collect()
}

/// Orders images the way they appear in the source document.
pub fn sort_images(images: &mut [DocumentImage]) {
    images.sort_by_key(|image| (image.page_num, image.order));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(page_num: u32, order: u32, path: &str) -> DocumentImage {
        DocumentImage {
            page_num,
            order,
            img_path: path.to_string(),
            caption: String::new(),
            ocr_text: String::new(),
        }
    }

    #[test]
    fn images_round_trip_through_metadata_string() {
        let images = vec![image(1, 0, "media/a.jpg"), image(2, 1, "media/b.jpg")];
        let encoded = encode_images(&images).expect("encode");
        let decoded = decode_images(&encoded).expect("decode");
        assert_eq!(decoded, images);
    }

    #[test]
    fn decoding_fills_missing_positions() {
        let decoded = decode_images(r#"[{"img_path": "media/x.jpg"}]"#).expect("decode");
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].page_num, 999);
        assert_eq!(decoded[0].order, 0);
    }

    #[test]
    fn dedup_keeps_first_occurrence() {
        let deduped = dedup_images(vec![
            image(0, 0, "media/x.jpg"),
            image(5, 7, "media/x.jpg"),
            image(1, 0, "media/y.jpg"),
            image(0, 0, ""),
        ]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].page_num, 0);
        assert_eq!(deduped[1].img_path, "media/y.jpg");
    }

    #[test]
    fn images_sort_by_page_then_order() {
        let mut images = vec![
            image(1, 2, "a"),
            image(0, 5, "b"),
            image(1, 0, "c"),
            image(0, 0, "d"),
        ];
        sort_images(&mut images);
        let positions: Vec<(u32, u32)> = images
            .iter()
            .map(|image| (image.page_num, image.order))
            .collect();
        assert_eq!(positions, vec![(0, 0), (0, 5), (1, 0), (1, 2)]);
    }

    #[test]
    fn missing_page_number_sorts_last() {
        let mut images = vec![
            decode_images(r#"[{"img_path": "media/no_page.jpg"}]"#).expect("decode")[0].clone(),
            image(3, 0, "media/paged.jpg"),
        ];
        sort_images(&mut images);
        assert_eq!(images[1].img_path, "media/no_page.jpg");
    }
}

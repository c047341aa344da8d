use crate::llm::LanguageModel;
use crate::models::{
    decode_images, dedup_images, sort_images, Answer, AnswerImage, DocumentImage, ScoredChunk,
};
use crate::traits::VectorIndex;
use regex::Regex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

const ANSWER_IMAGE_CAP: usize = 3;
const RAW_ANSWER_PREFIX_CHARS: usize = 1000;
const CONTEXT_DELIMITER: &str = "\n---\n";
const UNAVAILABLE_ANSWER: &str =
    "Sorry, the answer service is unavailable right now. Please try again in a moment.";

/// What the model is asked to emit. Every field is optional in practice;
/// whatever it leaves out is back-filled from retrieval-derived data.
#[derive(Debug, Deserialize)]
struct ModelAnswer {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    images: Vec<AnswerImage>,
    #[serde(default)]
    source: String,
    #[serde(default)]
    link_to_document: String,
}

/// Everything the retrieval pass alone can say about a question: context
/// passages, the document's screenshots (deduplicated, in reading order), the
/// best-matching source, and a document link scraped from the chunk text.
#[derive(Debug, Default)]
struct RetrievalDerived {
    context: Vec<String>,
    sources: Vec<String>,
    images: Vec<DocumentImage>,
    best_source: String,
    link: String,
}

impl RetrievalDerived {
    fn collect(results: &[ScoredChunk]) -> Self {
        let url_pattern = Regex::new(r"https?://\S+").ok();

        let mut derived = RetrievalDerived::default();
        let mut images = Vec::new();
        let mut best_score: Option<f32> = None;

        for chunk in results {
            derived.context.push(chunk.text.clone());

            if !chunk.metadata.images.trim().is_empty() {
                match decode_images(&chunk.metadata.images) {
                    Ok(decoded) => images.extend(decoded),
                    Err(error) => {
                        warn!(source = %chunk.metadata.source, %error, "malformed image metadata");
                    }
                }
            }

            if !chunk.metadata.source.is_empty()
                && !derived.sources.contains(&chunk.metadata.source)
            {
                derived.sources.push(chunk.metadata.source.clone());
            }

            if let Some(url) = trailing_url(url_pattern.as_ref(), &chunk.text) {
                derived.link = url;
            }

            // Strict comparison keeps the first-seen result on score ties.
            if best_score.map_or(true, |score| chunk.score < score) {
                best_score = Some(chunk.score);
                derived.best_source = chunk.metadata.source.clone();
            }
        }

        let mut images = dedup_images(images);
        sort_images(&mut images);
        derived.images = images;
        derived
    }

    fn capped_images(&self) -> Vec<AnswerImage> {
        self.images
            .iter()
            .take(ANSWER_IMAGE_CAP)
            .map(AnswerImage::from)
            .collect()
    }
}

/// Turns a question into a structured Answer. Stateless across questions;
/// never returns an error: every failure path degrades to a usable Answer.
pub struct AnswerEngine<S, L> {
    index: Arc<S>,
    llm: L,
    top_k: usize,
}

impl<S, L> AnswerEngine<S, L>
where
    S: VectorIndex + Send + Sync,
    L: LanguageModel,
{
    pub fn new(index: Arc<S>, llm: L, top_k: usize) -> Self {
        Self { index, llm, top_k }
    }

    pub async fn answer(&self, question: &str) -> Answer {
        let results = match self.index.search(question, self.top_k).await {
            Ok(results) => results,
            Err(error) => {
                warn!(%error, "retrieval failed, answering without context");
                Vec::new()
            }
        };

        let derived = RetrievalDerived::collect(&results);
        let prompt = build_prompt(question, &derived);

        match self.llm.generate(&prompt).await {
            Ok(raw) => assemble(&raw, &derived),
            Err(error) => {
                warn!(%error, "generation failed");
                Answer {
                    answer: UNAVAILABLE_ANSWER.to_string(),
                    images: derived.capped_images(),
                    source: derived.best_source.clone(),
                    link_to_document: derived.link.clone(),
                }
            }
        }
    }
}

/// Model output handling: parse the embedded JSON object when there is one,
/// otherwise fall back to the raw response plus retrieval-derived fields.
fn assemble(raw: &str, derived: &RetrievalDerived) -> Answer {
    let parsed = match extract_json_object(raw) {
        Some(json) => match serde_json::from_str::<ModelAnswer>(json) {
            Ok(parsed) => Some(parsed),
            Err(error) => {
                warn!(%error, "model emitted unparseable JSON");
                None
            }
        },
        None => None,
    };

    match parsed {
        Some(mut model_answer) => {
            model_answer.images.truncate(ANSWER_IMAGE_CAP);
            Answer {
                answer: model_answer.answer,
                images: if model_answer.images.is_empty() {
                    derived.capped_images()
                } else {
                    model_answer.images
                },
                source: if model_answer.source.is_empty() {
                    derived.best_source.clone()
                } else {
                    model_answer.source
                },
                link_to_document: if model_answer.link_to_document.is_empty() {
                    derived.link.clone()
                } else {
                    model_answer.link_to_document
                },
            }
        }
        None => Answer {
            answer: char_prefix(raw, RAW_ANSWER_PREFIX_CHARS),
            images: derived.capped_images(),
            source: derived.best_source.clone(),
            link_to_document: derived.link.clone(),
        },
    }
}

fn build_prompt(question: &str, derived: &RetrievalDerived) -> String {
    let context = derived.context.join(CONTEXT_DELIMITER);
    let sources = derived.sources.join(", ");

    format!(
        "You are an assistant for internal documentation. Answer briefly and to the point.\n\
         \n\
         Question: {question}\n\
         Source documents: {sources}\n\
         Context:\n{context}\n\
         \n\
         Instructions:\n\
         - Answer the question; if the source describes steps, answer step by step.\n\
         - Name the source document you used.\n\
         - If screenshots are present, say that screenshots from the manual are attached \
         and keep them in order of appearance.\n\
         - Respond strictly with a JSON object with keys \"answer\", \"images\", \
         \"source\" and \"link_to_document\".\n\
         \n\
         Example:\n\
         {{\n\
           \"answer\": \"Press F12.\",\n\
           \"images\": [{{\"img_path\": \"media/manual_page5_0.jpg\", \"caption\": \"The F12 key\"}}],\n\
           \"source\": \"manual.pdf\",\n\
           \"link_to_document\": \"\"\n\
         }}\n"
    )
}

/// Last URL of a chunk's text, matched to the end of its non-whitespace run.
fn trailing_url(pattern: Option<&Regex>, text: &str) -> Option<String> {
    pattern?
        .find_iter(text)
        .last()
        .map(|found| found.as_str().to_string())
}

/// First brace-delimited substring, greedy across newlines.
fn extract_json_object(raw: &str) -> Option<&str> {
    let pattern = Regex::new(r"(?s)\{.*\}").ok()?;
    pattern.find(raw).map(|found| found.as_str())
}

fn char_prefix(text: &str, count: usize) -> String {
    text.chars().take(count).collect()
}

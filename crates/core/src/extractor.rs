use crate::error::IngestError;
use lopdf::Document;
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// Supported source document formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
}

pub fn detect_kind(path: &Path) -> Option<DocumentKind> {
    let extension = path.extension()?.to_str()?;
    if extension.eq_ignore_ascii_case("pdf") {
        Some(DocumentKind::Pdf)
    } else if extension.eq_ignore_ascii_case("docx") {
        Some(DocumentKind::Docx)
    } else {
        None
    }
}

pub fn extract_text(path: &Path, kind: DocumentKind) -> Result<String, IngestError> {
    match kind {
        DocumentKind::Pdf => extract_pdf_text(path),
        DocumentKind::Docx => extract_docx_text(path),
    }
}

/// Extracts page text in page order, each page prefixed with a `[Page N]`
/// marker (1-based, matching the page numbering a reader sees). A page whose
/// text cannot be decoded contributes nothing; the document is only an error
/// when it cannot be opened at all.
pub fn extract_pdf_text(path: &Path) -> Result<String, IngestError> {
    let document =
        Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;

    let mut full_text = String::new();
    for (index, (page_no, _object_id)) in document.get_pages().iter().enumerate() {
        match document.extract_text(&[*page_no]) {
            Ok(text) if !text.trim().is_empty() => {
                full_text.push_str(&format!("\n[Page {}]\n{}\n", index + 1, text));
            }
            Ok(_) => {}
            Err(error) => {
                warn!(path = %path.display(), page = index + 1, %error, "unreadable page text");
            }
        }
    }

    Ok(full_text)
}

/// Extracts the body text of a DOCX archive from `word/document.xml`,
/// breaking paragraphs on `w:p` boundaries.
pub fn extract_docx_text(path: &Path) -> Result<String, IngestError> {
    let file = std::fs::File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|error| IngestError::DocxParse(error.to_string()))?;

    let mut document_xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|error| IngestError::DocxParse(error.to_string()))?
        .read_to_string(&mut document_xml)?;

    Ok(document_text_from_xml(&document_xml))
}

/// Collects the character content of `w:t` runs, separating paragraphs with
/// newlines. Tolerates attributes on the tags and self-closing runs.
fn document_text_from_xml(xml: &str) -> String {
    let mut text = String::new();
    let mut inside_run = false;
    let mut chars = xml.chars();

    while let Some(character) = chars.next() {
        if character == '<' {
            let mut tag = String::new();
            for tag_char in chars.by_ref() {
                if tag_char == '>' {
                    break;
                }
                tag.push(tag_char);
            }

            if is_opening(&tag, "w:t") {
                inside_run = true;
            } else if tag == "/w:t" {
                inside_run = false;
            } else if is_opening(&tag, "w:p") && !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
        } else if inside_run {
            text.push(character);
        }
    }

    unescape_xml(&text)
}

fn is_opening(tag: &str, name: &str) -> bool {
    if tag.ends_with('/') || tag.starts_with('/') {
        return false;
    }
    tag == name || tag.starts_with(&format!("{name} "))
}

fn unescape_xml(text: &str) -> String {
    text.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docx_xml_text_breaks_on_paragraphs() {
        let xml = r#"<w:document><w:body>
            <w:p><w:r><w:t>First paragraph.</w:t></w:r></w:p>
            <w:p><w:r><w:t xml:space="preserve">Second </w:t></w:r><w:r><w:t>half.</w:t></w:r></w:p>
        </w:body></w:document>"#;

        let text = document_text_from_xml(xml);
        assert_eq!(text, "First paragraph.\nSecond half.");
    }

    #[test]
    fn docx_xml_entities_are_unescaped() {
        let xml = "<w:p><w:t>Tom &amp; Jerry &lt;admin&gt;</w:t></w:p>";
        assert_eq!(document_text_from_xml(xml), "Tom & Jerry <admin>");
    }

    #[test]
    fn self_closing_runs_contribute_nothing() {
        let xml = "<w:p><w:t/><w:t>visible</w:t></w:p>";
        assert_eq!(document_text_from_xml(xml), "visible");
    }

    #[test]
    fn kind_detection_is_case_insensitive() {
        assert_eq!(detect_kind(Path::new("a.PDF")), Some(DocumentKind::Pdf));
        assert_eq!(detect_kind(Path::new("b.Docx")), Some(DocumentKind::Docx));
        assert_eq!(detect_kind(Path::new("c.txt")), None);
        assert_eq!(detect_kind(Path::new("noext")), None);
    }
}

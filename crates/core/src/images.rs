use crate::error::IngestError;
use crate::extractor::DocumentKind;
use crate::models::{DocumentImage, IngestionOptions};
use crate::ocr::OcrEngine;
use lopdf::{Dictionary, Document, Object, ObjectId, Stream};
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// Per-image outcome of an extraction pass. Failures stay attached to the
/// single image they came from; the caller aggregates.
#[derive(Debug)]
pub enum ImageOutcome {
    Extracted(DocumentImage),
    Skipped { name: String, reason: String },
}

/// Extracts every embedded raster of `path` into the media directory and OCRs
/// each one. A corrupt or unsupported image yields a `Skipped` outcome and
/// never aborts the rest of the document.
pub fn extract_document_images(
    path: &Path,
    kind: DocumentKind,
    options: &IngestionOptions,
    ocr: &dyn OcrEngine,
) -> Result<Vec<ImageOutcome>, IngestError> {
    std::fs::create_dir_all(&options.media_dir)?;

    match kind {
        DocumentKind::Pdf => extract_pdf_images(path, options, ocr),
        DocumentKind::Docx => extract_docx_images(path, options, ocr),
    }
}

/// Walks pages in order and their XObject entries in storage order. `order`
/// counts successfully persisted images per page; `page_num` is zero-based.
fn extract_pdf_images(
    path: &Path,
    options: &IngestionOptions,
    ocr: &dyn OcrEngine,
) -> Result<Vec<ImageOutcome>, IngestError> {
    let document =
        Document::load(path).map_err(|error| IngestError::PdfParse(error.to_string()))?;
    let stem = file_stem(path)?;

    let mut outcomes = Vec::new();
    for (page_index, (_page_no, page_id)) in document.get_pages().iter().enumerate() {
        let page_num = page_index as u32;
        let Some(xobjects) = page_xobjects(&document, *page_id) else {
            continue;
        };

        let mut order = 0u32;
        for (name, entry) in xobjects.iter() {
            let object = resolve(&document, entry);
            let Ok(stream) = object.as_stream() else {
                continue;
            };
            if !is_image_stream(stream) {
                continue;
            }

            let target = options
                .media_dir
                .join(format!("{stem}_page{page_num}_{order}.jpg"));

            match persist_pdf_image(stream, &target) {
                Ok(()) => {
                    let caption = format!("Screenshot from page {}", page_num + 1);
                    outcomes.push(ImageOutcome::Extracted(finish_image(
                        &target, page_num, order, caption, options, ocr,
                    )));
                    order += 1;
                }
                Err(reason) => {
                    debug!(page = page_num, object = %String::from_utf8_lossy(name), %reason, "skipping pdf image");
                    outcomes.push(ImageOutcome::Skipped {
                        name: String::from_utf8_lossy(name).to_string(),
                        reason,
                    });
                }
            }
        }
    }

    Ok(outcomes)
}

/// Walks `word/media/*` archive entries in storage order. `order` indexes the
/// media iteration itself, so a failed entry still consumes its slot; flow
/// documents have no pages at this point, so `page_num` is always 0.
fn extract_docx_images(
    path: &Path,
    options: &IngestionOptions,
    ocr: &dyn OcrEngine,
) -> Result<Vec<ImageOutcome>, IngestError> {
    let filename = file_name(path)?;
    let stem = file_stem(path)?;

    let file = std::fs::File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|error| IngestError::DocxParse(error.to_string()))?;

    let mut outcomes = Vec::new();
    let mut media_index = 0u32;

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|error| IngestError::DocxParse(error.to_string()))?;
        if entry.is_dir() || !entry.name().starts_with("word/media/") {
            continue;
        }

        let entry_name = entry.name().to_string();
        let order = media_index;
        media_index += 1;

        let mut data = Vec::new();
        if let Err(error) = entry.read_to_end(&mut data) {
            debug!(entry = %entry_name, %error, "skipping unreadable docx image");
            outcomes.push(ImageOutcome::Skipped {
                name: entry_name,
                reason: error.to_string(),
            });
            continue;
        }

        let target = options.media_dir.join(format!("{stem}_img_{order}.jpg"));
        match persist_docx_image(&data, &target) {
            Ok(()) => {
                let caption = format!("Image {} from {}", order + 1, filename);
                outcomes.push(ImageOutcome::Extracted(finish_image(
                    &target, 0, order, caption, options, ocr,
                )));
            }
            Err(reason) => {
                debug!(entry = %entry_name, %reason, "skipping docx image");
                outcomes.push(ImageOutcome::Skipped {
                    name: entry_name,
                    reason,
                });
            }
        }
    }

    Ok(outcomes)
}

fn file_stem(path: &Path) -> Result<&str, IngestError> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}

fn file_name(path: &Path) -> Result<&str, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}

fn resolve<'a>(document: &'a Document, object: &'a Object) -> &'a Object {
    match object {
        Object::Reference(id) => document.get_object(*id).unwrap_or(object),
        _ => object,
    }
}

fn page_xobjects(document: &Document, page_id: ObjectId) -> Option<&Dictionary> {
    let page = document.get_object(page_id).ok()?.as_dict().ok()?;
    let resources = resolve(document, page.get(b"Resources").ok()?).as_dict().ok()?;
    resolve(document, resources.get(b"XObject").ok()?)
        .as_dict()
        .ok()
}

fn is_image_stream(stream: &Stream) -> bool {
    stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .map(|name| name == b"Image")
        .unwrap_or(false)
}

fn primary_filter(stream: &Stream) -> Option<Vec<u8>> {
    match stream.dict.get(b"Filter").ok()? {
        Object::Name(name) => Some(name.clone()),
        Object::Array(items) => items
            .first()
            .and_then(|item| item.as_name().ok())
            .map(<[u8]>::to_vec),
        _ => None,
    }
}

fn dimension(stream: &Stream, key: &[u8]) -> Result<u32, String> {
    stream
        .dict
        .get(key)
        .and_then(Object::as_i64)
        .map(|value| value as u32)
        .map_err(|error| error.to_string())
}

/// DCT streams are already JPEG and are written out verbatim. Flate streams
/// are treated as raw RGB8 of the declared size and re-encoded. Anything else
/// is unsupported and contributes no image.
fn persist_pdf_image(stream: &Stream, target: &Path) -> Result<(), String> {
    let filter = primary_filter(stream);
    match filter.as_deref() {
        Some(name) if name == b"DCTDecode" => {
            std::fs::write(target, &stream.content).map_err(|error| error.to_string())
        }
        Some(name) if name == b"FlateDecode" => {
            let data = stream
                .decompressed_content()
                .map_err(|error| error.to_string())?;
            let width = dimension(stream, b"Width")?;
            let height = dimension(stream, b"Height")?;
            let expected = width as usize * height as usize * 3;
            if data.len() < expected {
                return Err(format!(
                    "raster data too short: {} bytes for {width}x{height}",
                    data.len()
                ));
            }

            let Some(raster) = image::RgbImage::from_raw(width, height, data[..expected].to_vec())
            else {
                return Err(format!("raster buffer rejected for {width}x{height}"));
            };
            raster.save(target).map_err(|error| error.to_string())
        }
        Some(other) => Err(format!(
            "unsupported image filter: {}",
            String::from_utf8_lossy(other)
        )),
        None => Err("missing image filter".to_string()),
    }
}

fn persist_docx_image(data: &[u8], target: &Path) -> Result<(), String> {
    let decoded = image::load_from_memory(data).map_err(|error| error.to_string())?;
    decoded.to_rgb8().save(target).map_err(|error| error.to_string())
}

/// OCR failure degrades to empty text for this image only.
fn finish_image(
    target: &Path,
    page_num: u32,
    order: u32,
    caption: String,
    options: &IngestionOptions,
    ocr: &dyn OcrEngine,
) -> DocumentImage {
    let ocr_text = match std::fs::read(target) {
        Ok(bytes) => match ocr.recognize(&bytes, &options.ocr_languages) {
            Ok(text) => text,
            Err(error) => {
                warn!(image = %target.display(), %error, "ocr failed");
                String::new()
            }
        },
        Err(error) => {
            warn!(image = %target.display(), %error, "cannot re-read persisted image");
            String::new()
        }
    };

    DocumentImage {
        page_num,
        order,
        img_path: target.to_string_lossy().to_string(),
        caption,
        ocr_text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::DisabledOcr;
    use lopdf::dictionary;
    use std::io::Write;
    use tempfile::tempdir;

    fn options_in(dir: &Path) -> IngestionOptions {
        IngestionOptions {
            media_dir: dir.join("media"),
            ..IngestionOptions::default()
        }
    }

    fn jpeg_stream(filter: &str) -> Stream {
        Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => 2,
                "Height" => 2,
                "ColorSpace" => "DeviceRGB",
                "BitsPerComponent" => 8,
                "Filter" => filter,
            },
            b"\xFF\xD8fake-jpeg-bytes".to_vec(),
        )
    }

    #[test]
    fn image_streams_are_recognized_by_subtype() {
        assert!(is_image_stream(&jpeg_stream("DCTDecode")));

        let font = Stream::new(dictionary! { "Subtype" => "TrueType" }, Vec::new());
        assert!(!is_image_stream(&font));
    }

    #[test]
    fn filter_is_read_from_name_or_array() {
        let named = jpeg_stream("DCTDecode");
        assert_eq!(primary_filter(&named).as_deref(), Some(&b"DCTDecode"[..]));

        let array = Stream::new(
            dictionary! {
                "Subtype" => "Image",
                "Filter" => vec!["FlateDecode".into(), "DCTDecode".into()],
            },
            Vec::new(),
        );
        assert_eq!(primary_filter(&array).as_deref(), Some(&b"FlateDecode"[..]));
    }

    #[test]
    fn unsupported_filter_is_skipped_not_fatal() {
        let dir = tempdir().expect("tempdir");
        let stream = jpeg_stream("JPXDecode");
        let result = persist_pdf_image(&stream, &dir.path().join("out.jpg"));
        assert!(result.is_err());
        assert!(!dir.path().join("out.jpg").exists());
    }

    #[test]
    fn dct_streams_are_written_verbatim() {
        let dir = tempdir().expect("tempdir");
        let stream = jpeg_stream("DCTDecode");
        let target = dir.path().join("out.jpg");
        persist_pdf_image(&stream, &target).expect("persist");
        assert_eq!(std::fs::read(&target).expect("read"), stream.content);
    }

    fn write_docx_with_images(path: &Path, entries: &[(&str, Vec<u8>)]) {
        let file = std::fs::File::create(path).expect("create docx");
        let mut writer = zip::ZipWriter::new(file);
        let plain = zip::write::FileOptions::default();

        writer
            .start_file("word/document.xml", plain)
            .expect("start document.xml");
        writer
            .write_all(b"<w:document><w:body><w:p><w:t>Body</w:t></w:p></w:body></w:document>")
            .expect("write document.xml");

        for (name, bytes) in entries {
            writer.start_file(*name, plain).expect("start media entry");
            writer.write_all(bytes).expect("write media entry");
        }
        writer.finish().expect("finish docx");
    }

    fn png_bytes() -> Vec<u8> {
        let mut bytes = Vec::new();
        let raster = image::RgbImage::from_pixel(2, 2, image::Rgb([200, 10, 10]));
        raster
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .expect("encode png");
        bytes
    }

    #[test]
    fn docx_media_entries_become_document_images() {
        let dir = tempdir().expect("tempdir");
        let docx_path = dir.path().join("manual.docx");
        write_docx_with_images(
            &docx_path,
            &[
                ("word/media/image1.png", png_bytes()),
                ("word/media/broken.png", b"not an image".to_vec()),
            ],
        );

        let options = options_in(dir.path());
        let outcomes =
            extract_document_images(&docx_path, DocumentKind::Docx, &options, &DisabledOcr)
                .expect("extract");

        assert_eq!(outcomes.len(), 2);
        let extracted: Vec<&DocumentImage> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                ImageOutcome::Extracted(image) => Some(image),
                ImageOutcome::Skipped { .. } => None,
            })
            .collect();
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].page_num, 0);
        assert_eq!(extracted[0].order, 0);
        assert!(extracted[0].img_path.ends_with("manual_img_0.jpg"));
        assert!(std::path::Path::new(&extracted[0].img_path).exists());
    }
}

use crate::error::IngestError;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Text recognition over an extracted raster image. Failures are isolated by
/// the caller to the single image being processed.
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image: &[u8], languages: &[String]) -> Result<String, IngestError>;
}

impl<T: OcrEngine + ?Sized> OcrEngine for Box<T> {
    fn recognize(&self, image: &[u8], languages: &[String]) -> Result<String, IngestError> {
        (**self).recognize(image, languages)
    }
}

/// No-op engine for deployments without an OCR service; every image degrades
/// to empty recognized text.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledOcr;

impl OcrEngine for DisabledOcr {
    fn recognize(&self, _image: &[u8], _languages: &[String]) -> Result<String, IngestError> {
        Ok(String::new())
    }
}

#[derive(Debug, Clone, Serialize)]
struct OcrRequest<'a> {
    image_base64: String,
    languages: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
struct OcrResponse {
    #[serde(default)]
    text: Option<String>,
}

/// Client for an HTTP OCR service that accepts a base64 image plus language
/// hints and returns recognized text.
pub struct HttpOcrClient {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpOcrClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self, IngestError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            endpoint: endpoint.into(),
            api_key,
            client,
        })
    }

    fn recognize_blocking(&self, image: &[u8], languages: &[String]) -> Result<String, IngestError> {
        let payload = OcrRequest {
            image_base64: STANDARD.encode(image),
            languages,
        };

        let mut request = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(&payload);

        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send()?;

        if !response.status().is_success() {
            return Err(IngestError::OcrFailed(format!(
                "ocr request to {} returned {}",
                self.endpoint,
                response.status()
            )));
        }

        let payload: OcrResponse = response.json()?;
        Ok(payload
            .text
            .map(|text| text.trim().to_string())
            .unwrap_or_default())
    }
}

impl OcrEngine for HttpOcrClient {
    fn recognize(&self, image: &[u8], languages: &[String]) -> Result<String, IngestError> {
        // The blocking client must not run on an async worker directly.
        tokio::task::block_in_place(|| self.recognize_blocking(image, languages))
    }
}

use super::{build_http_client, ensure_success, Detection, ObjectDetector, ServiceError};
use crate::config::ServiceSettings;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Object detection over `POST <url>` with the raw image as body.
///
/// The service answers `{"detections": [{"name": .., "confidence": ..}]}`.
pub struct HttpObjectDetector {
    http: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct DetectionResponse {
    #[serde(default)]
    detections: Vec<Detection>,
}

impl HttpObjectDetector {
    /// Create a detector, or `None` when no endpoint is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Network`] if the HTTP client cannot be built.
    pub fn from_settings(settings: &ServiceSettings) -> Result<Option<Self>, ServiceError> {
        let Some(url) = settings.vision_url.clone() else {
            return Ok(None);
        };
        Ok(Some(Self {
            http: build_http_client(settings.request_timeout())?,
            url,
        }))
    }
}

fn parse_detections(body: &[u8]) -> Result<Vec<Detection>, ServiceError> {
    let parsed: DetectionResponse =
        serde_json::from_slice(body).map_err(|e| ServiceError::Malformed(e.to_string()))?;
    Ok(parsed
        .detections
        .into_iter()
        .map(|d| Detection {
            confidence: d.confidence.clamp(0.0, 1.0),
            ..d
        })
        .collect())
}

#[async_trait]
impl ObjectDetector for HttpObjectDetector {
    #[instrument(skip_all, fields(image_bytes = image.len()))]
    async fn detect(&self, image: Vec<u8>) -> Result<Vec<Detection>, ServiceError> {
        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "image/jpeg")
            .body(image)
            .send()
            .await?;
        let body = ensure_success(response).await?.bytes().await?;
        let detections = parse_detections(&body)?;
        debug!("Detector returned {} objects", detections.len());
        Ok(detections)
    }
}

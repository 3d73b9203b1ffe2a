//! Collaborators invoked after admission.
//!
//! Each one sits behind a narrow trait; the bundled implementations are
//! thin `reqwest` clients against configurable HTTP endpoints.

mod inference;
mod speech;
mod vision;

pub use inference::HttpInferenceClient;
pub use speech::HttpSpeechTranscriber;
pub use vision::HttpObjectDetector;

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur while calling a collaborator
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Error during network communication (connect, timeout, reset)
    #[error("Network error: {0}")]
    Network(String),
    /// The service answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Response body or reason
        message: String,
    },
    /// The response body could not be interpreted
    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Whether the failure happened at the transport level.
    #[must_use]
    pub const fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Malformed(e.to_string())
        } else if let Some(status) = e.status() {
            Self::Api {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            Self::Network(e.to_string())
        }
    }
}

/// An object found in an image.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Detection {
    /// Class label
    pub name: String,
    /// Confidence in `0.0..=1.0`
    pub confidence: f32,
}

/// Remote text generation.
#[async_trait]
pub trait TextInference: Send + Sync {
    /// Answer `prompt`. `None` when the service had nothing to say.
    async fn complete(&self, prompt: &str) -> Result<Option<String>, ServiceError>;
}

/// Object detection on a still image.
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    /// Detect objects in an encoded image.
    async fn detect(&self, image: Vec<u8>) -> Result<Vec<Detection>, ServiceError>;
}

/// Speech-to-text on a voice note.
#[async_trait]
pub trait SpeechTranscriber: Send + Sync {
    /// Transcribe encoded audio of the given MIME type.
    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<String, ServiceError>;
}

/// Turn a non-success response into [`ServiceError::Api`].
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Api {
        status: status.as_u16(),
        message: if body.is_empty() {
            status.to_string()
        } else {
            body
        },
    })
}

fn build_http_client(timeout: std::time::Duration) -> Result<reqwest::Client, ServiceError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| ServiceError::Network(format!("failed to build HTTP client: {e}")))
}

/// The collaborators available to message handlers.
///
/// Vision and speech are optional; handlers answer with a
/// "feature unavailable" message when their endpoint is not configured.
pub struct Services {
    /// Text inference
    pub inference: Arc<dyn TextInference>,
    /// Object detection on photos
    pub detector: Option<Arc<dyn ObjectDetector>>,
    /// Transcription of voice notes
    pub transcriber: Option<Arc<dyn SpeechTranscriber>>,
}

impl Services {
    /// Build the HTTP collaborators described by `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Network`] if an HTTP client cannot be built.
    pub fn from_settings(settings: &crate::config::ServiceSettings) -> Result<Self, ServiceError> {
        let detector = HttpObjectDetector::from_settings(settings)?
            .map(|d| Arc::new(d) as Arc<dyn ObjectDetector>);
        let transcriber = HttpSpeechTranscriber::from_settings(settings)?
            .map(|t| Arc::new(t) as Arc<dyn SpeechTranscriber>);
        Ok(Self {
            inference: Arc::new(HttpInferenceClient::new(settings)?),
            detector,
            transcriber,
        })
    }
}

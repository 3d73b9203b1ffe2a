use super::{build_http_client, ensure_success, ServiceError, SpeechTranscriber};
use crate::config::ServiceSettings;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, instrument};

/// Speech transcription over `POST <url>` with the raw audio as body.
///
/// The service answers `{"text": "..."}`.
pub struct HttpSpeechTranscriber {
    http: reqwest::Client,
    url: String,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

impl HttpSpeechTranscriber {
    /// Create a transcriber, or `None` when no endpoint is configured.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Network`] if the HTTP client cannot be built.
    pub fn from_settings(settings: &ServiceSettings) -> Result<Option<Self>, ServiceError> {
        let Some(url) = settings.speech_url.clone() else {
            return Ok(None);
        };
        Ok(Some(Self {
            http: build_http_client(settings.request_timeout())?,
            url,
        }))
    }
}

fn parse_transcription(body: &[u8]) -> Result<String, ServiceError> {
    let parsed: TranscriptionResponse =
        serde_json::from_slice(body).map_err(|e| ServiceError::Malformed(e.to_string()))?;
    Ok(parsed.text.trim().to_string())
}

#[async_trait]
impl SpeechTranscriber for HttpSpeechTranscriber {
    #[instrument(skip_all, fields(audio_bytes = audio.len(), %mime_type))]
    async fn transcribe(&self, audio: Vec<u8>, mime_type: &str) -> Result<String, ServiceError> {
        let response = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(audio)
            .send()
            .await?;
        let body = ensure_success(response).await?.bytes().await?;
        let text = parse_transcription(&body)?;
        debug!("Transcriber returned {} chars", text.len());
        Ok(text)
    }
}

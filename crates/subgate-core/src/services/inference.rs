use super::{build_http_client, ensure_success, ServiceError, TextInference};
use crate::config::ServiceSettings;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

/// Text inference over `GET <url>?q=<prompt>` returning a JSON object.
pub struct HttpInferenceClient {
    http: reqwest::Client,
    url: String,
    response_field: String,
}

impl HttpInferenceClient {
    /// Create a client from settings.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Network`] if the HTTP client cannot be built.
    pub fn new(settings: &ServiceSettings) -> Result<Self, ServiceError> {
        Ok(Self {
            http: build_http_client(settings.request_timeout())?,
            url: settings.inference_url.clone(),
            response_field: settings.inference_response_field.clone(),
        })
    }
}

/// Pull the answer out of a response body.
///
/// Missing, null or blank fields mean "no answer"; a non-string value is
/// rendered as JSON.
fn extract_answer(body: &Value, field: &str) -> Result<Option<String>, ServiceError> {
    let Value::Object(map) = body else {
        return Err(ServiceError::Malformed(
            "expected a JSON object".to_string(),
        ));
    };
    let answer = match map.get(field) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.trim().to_string()),
        Some(other) => Some(other.to_string()),
    };
    Ok(answer.filter(|s| !s.is_empty()))
}

#[async_trait]
impl TextInference for HttpInferenceClient {
    #[instrument(skip_all, fields(prompt_len = prompt.len()))]
    async fn complete(&self, prompt: &str) -> Result<Option<String>, ServiceError> {
        let response = self
            .http
            .get(&self.url)
            .query(&[("q", prompt)])
            .send()
            .await?;
        let body: Value = ensure_success(response).await?.json().await?;
        let answer = extract_answer(&body, &self.response_field)?;
        debug!(
            "Inference answered with {} chars",
            answer.as_ref().map_or(0, String::len)
        );
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_answer_string() -> Result<(), ServiceError> {
        let body = json!({"status": true, "BK9": "  Hello there  "});
        assert_eq!(
            extract_answer(&body, "BK9")?,
            Some("Hello there".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_extract_answer_missing_or_blank() -> Result<(), ServiceError> {
        assert_eq!(extract_answer(&json!({"other": 1}), "BK9")?, None);
        assert_eq!(extract_answer(&json!({"BK9": null}), "BK9")?, None);
        assert_eq!(extract_answer(&json!({"BK9": "   "}), "BK9")?, None);
        Ok(())
    }

    #[test]
    fn test_extract_answer_non_string() -> Result<(), ServiceError> {
        assert_eq!(
            extract_answer(&json!({"BK9": 42}), "BK9")?,
            Some("42".to_string())
        );
        Ok(())
    }

    #[test]
    fn test_extract_answer_rejects_non_object() {
        assert!(matches!(
            extract_answer(&json!(["BK9"]), "BK9"),
            Err(ServiceError::Malformed(_))
        ));
    }
}

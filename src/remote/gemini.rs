//! Gemini generateContent client

use async_trait::async_trait;
use serde_json::{json, Value};

use super::provider::{truncate_body, ProviderError, RemoteProvider, RemoteRequest, ResponseFormat};
use crate::config::ProviderConfig;

pub struct GeminiProvider {
    config: ProviderConfig,
    http_client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig, http_client: reqwest::Client) -> Self {
        Self { config, http_client }
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

/// Request body for one text + optional inline image turn
pub fn build_body(request: &RemoteRequest) -> Value {
    let mut parts = vec![json!({ "text": request.instruction })];
    if let Some(image) = &request.image {
        parts.push(json!({
            "inlineData": { "mimeType": image.mime_type, "data": image.base64() }
        }));
    }

    let mut body = json!({ "contents": [{ "parts": parts }] });
    if request.format == ResponseFormat::Json {
        body["generationConfig"] = json!({ "responseMimeType": "application/json" });
    }
    body
}

/// Pull the first candidate's text out of a response
pub fn extract_text(response: &Value) -> Result<String, ProviderError> {
    let parts = response["candidates"][0]["content"]["parts"]
        .as_array()
        .ok_or(ProviderError::EmptyResponse)?;

    let text: String = parts
        .iter()
        .filter_map(|p| p["text"].as_str())
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(text)
}

#[async_trait]
impl RemoteProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn complete(&self, request: &RemoteRequest) -> Result<String, ProviderError> {
        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        tracing::debug!("Calling Gemini {}", self.config.model);

        let response = self.http_client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&build_body(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status { status: status.as_u16(), body: truncate_body(body) });
        }

        let json: Value = response.json().await
            .map_err(|e| ProviderError::InvalidJson(e.to_string()))?;
        extract_text(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::image::ImagePayload;
    use std::sync::Arc;

    #[test]
    fn test_body_inlines_image_and_json_mode() {
        let request = RemoteRequest {
            instruction: "identify".to_string(),
            image: Some(Arc::new(ImagePayload { mime_type: "image/jpeg".to_string(), data: vec![1, 2, 3] })),
            format: ResponseFormat::Json,
        };

        let body = build_body(&request);
        assert_eq!(body["contents"][0]["parts"][0]["text"], "identify");
        assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["mimeType"], "image/jpeg");
        assert_eq!(body["contents"][0]["parts"][1]["inlineData"]["data"], "AQID");
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    }

    #[test]
    fn test_text_request_has_no_generation_config() {
        let request = RemoteRequest {
            instruction: "read".to_string(),
            image: None,
            format: ResponseFormat::Text,
        };
        let body = build_body(&request);
        assert!(body.get("generationConfig").is_none());
        assert_eq!(body["contents"][0]["parts"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_extract_text() {
        let response = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"predictions\"" }, { "text": ": []}" }] } }]
        });
        assert_eq!(extract_text(&response).unwrap(), "{\"predictions\": []}");

        let blocked = json!({ "promptFeedback": { "blockReason": "SAFETY" } });
        assert!(matches!(extract_text(&blocked), Err(ProviderError::EmptyResponse)));
    }

    #[test]
    fn test_unconfigured_without_key() {
        let provider = GeminiProvider::new(
            ProviderConfig { api_key: None, model: "m".to_string(), base_url: "http://localhost".to_string() },
            reqwest::Client::new(),
        );
        assert!(!provider.is_configured());
        assert_eq!(provider.endpoint(), "http://localhost/models/m:generateContent");
    }
}

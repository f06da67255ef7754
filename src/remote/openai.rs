//! OpenAI-compatible chat completions client

use async_trait::async_trait;
use serde_json::{json, Value};

use super::provider::{truncate_body, ProviderError, RemoteProvider, RemoteRequest, ResponseFormat};
use crate::config::ProviderConfig;

pub struct OpenAiProvider {
    config: ProviderConfig,
    http_client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(config: ProviderConfig, http_client: reqwest::Client) -> Self {
        Self { config, http_client }
    }
}

pub fn build_body(model: &str, request: &RemoteRequest) -> Value {
    let mut content = vec![json!({ "type": "text", "text": request.instruction })];
    if let Some(image) = &request.image {
        content.push(json!({
            "type": "image_url",
            "image_url": { "url": image.data_url() }
        }));
    }

    let mut body = json!({
        "model": model,
        "messages": [{ "role": "user", "content": content }],
        "max_tokens": 1024
    });
    if request.format == ResponseFormat::Json {
        body["response_format"] = json!({ "type": "json_object" });
    }
    body
}

pub fn extract_text(response: &Value) -> Result<String, ProviderError> {
    let text = response["choices"][0]["message"]["content"]
        .as_str()
        .ok_or(ProviderError::EmptyResponse)?;

    if text.trim().is_empty() {
        return Err(ProviderError::EmptyResponse);
    }
    Ok(text.to_string())
}

#[async_trait]
impl RemoteProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn complete(&self, request: &RemoteRequest) -> Result<String, ProviderError> {
        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        tracing::debug!("Calling OpenAI-compatible {}", self.config.model);

        let response = self.http_client
            .post(&url)
            .bearer_auth(api_key)
            .json(&build_body(&self.config.model, request))
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
    fn test_body_uses_data_url() {
        let request = RemoteRequest {
            instruction: "identify".to_string(),
            image: Some(Arc::new(ImagePayload { mime_type: "image/png".to_string(), data: vec![0xff] })),
            format: ResponseFormat::Json,
        };

        let body = build_body("gpt-4o-mini", &request);
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["messages"][0]["content"][1]["image_url"]["url"], "data:image/png;base64,/w==");
        assert_eq!(body["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_extract_text() {
        let ok = json!({ "choices": [{ "message": { "content": "Sinigang" } }] });
        assert_eq!(extract_text(&ok).unwrap(), "Sinigang");

        let empty = json!({ "choices": [] });
        assert!(matches!(extract_text(&empty), Err(ProviderError::EmptyResponse)));
    }
}

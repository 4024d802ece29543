use crate::config::GenerationSettings;
use crate::error::{ActionPlanError, Result};
use crate::llm::client::{GenerationRequest, Role, TextGenerator};
use crate::llm::types::*;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};
use serde_json::json;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    /// Reads `GEMINI_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
            ActionPlanError::InvalidConfig("GEMINI_API_KEY is not set".to_string())
        })?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_payload(request: &GenerationRequest) -> GeminiRequest {
        let settings: &GenerationSettings = &request.settings;
        let contents = request
            .messages
            .iter()
            .map(|m| {
                let role = match m.role {
                    Role::User => "user",
                    Role::Model => "model",
                };
                GeminiContent::text(Some(role), m.text.clone())
            })
            .collect();

        let (response_mime_type, response_schema) = if settings.structured_output {
            (
                Some("application/json".to_string()),
                Some(json!({
                    "type": "OBJECT",
                    "properties": {
                        "correction": { "type": "STRING" },
                        "evidence": { "type": "STRING" },
                        "corrective_action": { "type": "STRING" }
                    },
                    "required": ["correction", "evidence", "corrective_action"]
                })),
            )
        } else {
            (None, None)
        };

        GeminiRequest {
            contents,
            system_instruction: request
                .system
                .as_ref()
                .map(|s| GeminiContent::text(None, s.clone())),
            generation_config: GeminiGenerationConfig {
                temperature: settings.temperature,
                max_output_tokens: settings.max_output_tokens,
                response_mime_type,
                response_schema,
            },
            safety_settings: HARM_CATEGORIES
                .iter()
                .map(|category| GeminiSafetySetting {
                    category: *category,
                    threshold: settings.safety_threshold.as_api_str(),
                })
                .collect(),
        }
    }
}

fn classify_failure(status: StatusCode, body: String) -> ActionPlanError {
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
        ActionPlanError::QuotaExceeded(format!("Gemini (status {}): {}", status, body))
    } else {
        ActionPlanError::ProviderError(format!("Gemini API Error (status {}): {}", status, body))
    }
}

/// Joins the text parts of the first candidate. A blocked prompt, no
/// candidates, or an empty reply stopped by the safety filter is a
/// `ProviderError`; any other empty reply is returned as is.
fn extract_text(body: GeminiResponse) -> Result<String> {
    if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ActionPlanError::ProviderError(format!(
            "Prompt blocked by safety filter: {}",
            reason
        )));
    }

    let candidate = body
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| ActionPlanError::ProviderError("No candidates returned".to_string()))?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        if let Some(reason) = candidate.finish_reason.filter(|r| r == "SAFETY") {
            return Err(ActionPlanError::ProviderError(format!(
                "Reply withheld by safety filter ({})",
                reason
            )));
        }
    }
    Ok(text)
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, request.settings.model, self.api_key
        );
        let payload = Self::build_payload(request);

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();
        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(classify_failure(status, err_text));
        }

        let text = extract_text(res.json().await?)?;
        debug!("Gemini returned {} characters", text.len());
        Ok(text)
    }

    fn name(&self) -> &str {
        "gemini"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_maps_roles_and_structured_output() {
        let settings = GenerationSettings {
            structured_output: true,
            ..GenerationSettings::default()
        };
        let request = GenerationRequest::new("prompt", settings)
            .with_system("system")
            .followed_by("partial", "continue");

        let payload = serde_json::to_value(GeminiClient::build_payload(&request)).unwrap();

        assert_eq!(payload["contents"][0]["role"], "user");
        assert_eq!(payload["contents"][1]["role"], "model");
        assert_eq!(payload["contents"][2]["parts"][0]["text"], "continue");
        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], "system");
        assert_eq!(payload["generationConfig"]["maxOutputTokens"], 1000);
        assert_eq!(
            payload["generationConfig"]["responseMimeType"],
            "application/json"
        );
        assert_eq!(
            payload["safetySettings"][0]["threshold"],
            "BLOCK_MEDIUM_AND_ABOVE"
        );
    }

    #[test]
    fn test_quota_classification() {
        assert!(classify_failure(StatusCode::TOO_MANY_REQUESTS, String::new()).is_quota_exceeded());
        assert!(classify_failure(
            StatusCode::FORBIDDEN,
            "{\"status\": \"RESOURCE_EXHAUSTED\"}".to_string()
        )
        .is_quota_exceeded());
        assert!(!classify_failure(StatusCode::BAD_REQUEST, "bad".to_string()).is_quota_exceeded());
    }

    fn response(value: serde_json::Value) -> GeminiResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = response(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": "Correction " }, { "text": "immédiate" }] },
                "finishReason": "STOP"
            }]
        }));
        assert_eq!(extract_text(body).unwrap(), "Correction immédiate");
    }

    #[test]
    fn test_extract_text_blocked_prompt() {
        let body = response(json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
        let err = extract_text(body).unwrap_err();
        assert!(matches!(err, ActionPlanError::ProviderError(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_extract_text_safety_stop_with_empty_text() {
        let body = response(json!({
            "candidates": [{ "content": { "parts": [] }, "finishReason": "SAFETY" }]
        }));
        assert!(matches!(
            extract_text(body),
            Err(ActionPlanError::ProviderError(_))
        ));
    }

    #[test]
    fn test_extract_text_without_candidates() {
        assert!(matches!(
            extract_text(response(json!({}))),
            Err(ActionPlanError::ProviderError(_))
        ));
        assert!(matches!(
            extract_text(response(json!({ "candidates": [] }))),
            Err(ActionPlanError::ProviderError(_))
        ));
    }

    #[test]
    fn test_extract_text_empty_reply_without_safety_stop() {
        let body = response(json!({
            "candidates": [{ "content": { "parts": [] }, "finishReason": "MAX_TOKENS" }]
        }));
        assert_eq!(extract_text(body).unwrap(), "");
    }
}

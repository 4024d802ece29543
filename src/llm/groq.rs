use crate::error::{ActionPlanError, Result};
use crate::llm::client::{GenerationRequest, Role, TextGenerator};
use crate::llm::types::*;
use async_trait::async_trait;
use log::debug;
use reqwest::{Client, StatusCode};

const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Groq chat completions through its OpenAI-compatible endpoint.
///
/// The model name comes from `GenerationSettings::model`, so set it to a Groq
/// model (e.g. `llama-3.1-70b-versatile`) when using this client.
#[derive(Clone)]
pub struct GroqClient {
    client: Client,
    api_key: String,
    base_url: String,
}

impl GroqClient {
    pub fn new(api_key: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GROQ_BASE_URL.to_string(),
        }
    }

    /// Reads `GROQ_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GROQ_API_KEY")
            .map_err(|_| ActionPlanError::InvalidConfig("GROQ_API_KEY is not set".to_string()))?;
        Ok(Self::new(api_key))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_payload(request: &GenerationRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: match m.role {
                Role::User => "user".to_string(),
                Role::Model => "assistant".to_string(),
            },
            content: m.text.clone(),
        }));

        ChatRequest {
            model: request.settings.model.clone(),
            messages,
            temperature: request.settings.temperature,
            max_tokens: request.settings.max_output_tokens,
            response_format: request
                .settings
                .structured_output
                .then_some(ChatResponseFormat { kind: "json_object" }),
        }
    }
}

/// Content of the first choice. No choices is a `ProviderError`.
fn extract_text(body: ChatResponse) -> Result<String> {
    Ok(body
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ActionPlanError::ProviderError("No choices returned".to_string()))?
        .message
        .content
        .unwrap_or_default())
}

#[async_trait]
impl TextGenerator for GroqClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let payload = Self::build_payload(request);

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        let status = res.status();
        if !status.is_success() {
            let err_text = res.text().await?;
            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ActionPlanError::QuotaExceeded(format!(
                    "Groq rate limit reached: {}",
                    err_text
                )));
            }
            return Err(ActionPlanError::ProviderError(format!(
                "Groq API Error (status {}): {}",
                status, err_text
            )));
        }

        let text = extract_text(res.json().await?)?;

        debug!("Groq returned {} characters", text.len());
        Ok(text)
    }

    fn name(&self) -> &str {
        "groq"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationSettings;

    #[test]
    fn test_payload_uses_openai_roles() {
        let settings = GenerationSettings {
            model: "llama-3.1-70b-versatile".to_string(),
            ..GenerationSettings::default()
        };
        let request = GenerationRequest::new("prompt", settings)
            .with_system("system")
            .followed_by("partial", "continue");

        let payload = serde_json::to_value(GroqClient::build_payload(&request)).unwrap();

        assert_eq!(payload["model"], "llama-3.1-70b-versatile");
        assert_eq!(payload["messages"][0]["role"], "system");
        assert_eq!(payload["messages"][2]["role"], "assistant");
        assert_eq!(payload["max_tokens"], 1000);
        assert!(payload.get("response_format").is_none());
    }

    #[test]
    fn test_extract_text_first_choice() {
        let body: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [
                { "message": { "role": "assistant", "content": "Correction immédiate\nIsoler" } },
                { "message": { "role": "assistant", "content": "ignored" } }
            ]
        }))
        .unwrap();
        assert_eq!(extract_text(body).unwrap(), "Correction immédiate\nIsoler");
    }

    #[test]
    fn test_extract_text_without_choices() {
        let body: ChatResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(matches!(
            extract_text(body),
            Err(ActionPlanError::ProviderError(_))
        ));

        let null_content: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{ "message": { "content": null } }]
        }))
        .unwrap();
        assert_eq!(extract_text(null_content).unwrap(), "");
    }
}

use crate::config::GenerationSettings;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// A single generate call: optional system instruction, the conversation so
/// far, and the fixed generation settings.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub settings: GenerationSettings,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, settings: GenerationSettings) -> Self {
        Self {
            system: None,
            messages: vec![Message::user(prompt)],
            settings,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Continues the conversation with the model's last reply and a new user turn.
    pub fn followed_by(mut self, reply: impl Into<String>, prompt: impl Into<String>) -> Self {
        self.messages.push(Message::model(reply));
        self.messages.push(Message::user(prompt));
        self
    }
}

/// A hosted generative-text endpoint that turns a prompt into free text.
///
/// Implementations map rate-limit replies to `QuotaExceeded` and any other
/// failure to `ProviderError` (or `Http` for transport errors).
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;

    fn name(&self) -> &str {
        "generator"
    }
}

#[async_trait]
impl<T: TextGenerator + ?Sized> TextGenerator for std::sync::Arc<T> {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        (**self).generate(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

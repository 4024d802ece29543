use crate::config::{GenerationSettings, RetryPolicy};
use crate::error::{ActionPlanError, Result};
use crate::llm::client::{GenerationRequest, TextGenerator};
use crate::llm::parser::{log_missing, parse_response_quietly, ParsedRecommendation};
use crate::llm::prompts::{CONTINUATION_PROMPT, SYSTEM_PROMPT};
use crate::llm::types::PipelineEvent;
use log::{debug, warn};
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;

pub(crate) async fn send_event(sender: &Option<Sender<PipelineEvent>>, event: PipelineEvent) {
    if let Some(tx) = sender {
        let _ = tx.send(event).await;
    }
}

/// Sends prompts to a `TextGenerator` under a bounded retry policy.
pub struct RecommendationRequester<G> {
    generator: G,
    settings: GenerationSettings,
    retry: RetryPolicy,
    system_prompt: String,
}

impl<G: TextGenerator> RecommendationRequester<G> {
    pub fn new(generator: G, settings: GenerationSettings, retry: RetryPolicy) -> Self {
        Self {
            generator,
            settings,
            retry,
            system_prompt: SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Sends `request` and returns the raw reply.
    ///
    /// Quota and transport failures are resent until `max_attempts` is reached,
    /// waiting `delay_after(attempt)` in between. A blank reply is
    /// `EmptyResponse` and is never resent.
    pub async fn send(
        &self,
        request: &GenerationRequest,
        progress: &Option<Sender<PipelineEvent>>,
    ) -> Result<String> {
        let mut attempt = 1;
        loop {
            match self.generator.generate(request).await {
                Ok(text) if text.trim().is_empty() => return Err(ActionPlanError::EmptyResponse),
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(
                        "{} request failed (attempt {}/{}): {}. Retrying in {:?}",
                        self.generator.name(),
                        attempt,
                        self.retry.max_attempts,
                        e,
                        delay
                    );
                    send_event(
                        progress,
                        PipelineEvent::Retrying {
                            attempt,
                            error: e.to_string(),
                        },
                    )
                    .await;
                    sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Sends a recommendation prompt and parses the reply.
    ///
    /// While sections are missing, up to `continuation_attempts` follow-ups ask
    /// the model to carry on; each follow-up reply is appended to the text
    /// before parsing again. A failed follow-up keeps the partial result,
    /// except for quota exhaustion which is returned.
    pub async fn recommend(
        &self,
        prompt: &str,
        progress: &Option<Sender<PipelineEvent>>,
    ) -> Result<ParsedRecommendation> {
        let mut conversation = GenerationRequest::new(prompt, self.settings.clone())
            .with_system(self.system_prompt.clone());
        debug!("Sending prompt of {} characters", prompt.len());

        let mut last_reply = self.send(&conversation, progress).await?;
        let mut full_text = last_reply.clone();
        let mut parsed = parse_response_quietly(&full_text);

        for attempt in 1..=self.retry.continuation_attempts {
            if parsed.is_complete() {
                break;
            }
            send_event(progress, PipelineEvent::Continuing { attempt }).await;
            conversation = conversation.followed_by(last_reply, CONTINUATION_PROMPT);

            match self.send(&conversation, progress).await {
                Ok(more) => {
                    full_text.push('\n');
                    full_text.push_str(&more);
                    parsed = parse_response_quietly(&full_text);
                    last_reply = more;
                }
                Err(e) if e.is_quota_exceeded() => return Err(e),
                Err(e) => {
                    warn!("Continuation request failed, keeping partial reply: {}", e);
                    break;
                }
            }
        }

        log_missing(&parsed);
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use log::{Level, LevelFilter, Log, Metadata, Record};
    use std::cell::Cell;
    use std::sync::Mutex;

    thread_local! {
        static WARNINGS: Cell<usize> = const { Cell::new(0) };
    }

    /// Counts warnings emitted on the current thread.
    struct WarningCounter;

    impl Log for WarningCounter {
        fn enabled(&self, metadata: &Metadata) -> bool {
            metadata.level() <= Level::Warn
        }

        fn log(&self, record: &Record) {
            if record.level() == Level::Warn
                && record.args().to_string().contains("is missing from the reply")
            {
                WARNINGS.with(|w| w.set(w.get() + 1));
            }
        }

        fn flush(&self) {}
    }

    static COUNTER: WarningCounter = WarningCounter;

    struct Replies(Mutex<Vec<&'static str>>);

    #[async_trait]
    impl TextGenerator for Replies {
        async fn generate(&self, _request: &GenerationRequest) -> Result<String> {
            let mut replies = self.0.lock().unwrap();
            if replies.is_empty() {
                return Err(ActionPlanError::ProviderError("no more replies".to_string()));
            }
            Ok(replies.remove(0).to_string())
        }
    }

    #[tokio::test]
    async fn test_missing_sections_are_warned_once_after_continuations() {
        let _ = log::set_logger(&COUNTER);
        log::set_max_level(LevelFilter::Warn);
        WARNINGS.with(|w| w.set(0));

        let generator = Replies(Mutex::new(vec![
            "Correction immédiate\nIsoler le lot",
            "encore du texte",
            "toujours rien",
        ]));
        let retry = RetryPolicy {
            continuation_attempts: 2,
            ..RetryPolicy::none()
        };
        let requester = RecommendationRequester::new(generator, GenerationSettings::default(), retry);

        let parsed = requester.recommend("prompt", &None).await.unwrap();

        assert_eq!(parsed.missing.len(), 2);
        assert_eq!(WARNINGS.with(|w| w.get()), 2);
    }

    #[test]
    fn test_custom_system_prompt_is_exposed() {
        let requester = RecommendationRequester::new(
            Replies(Mutex::new(Vec::new())),
            GenerationSettings::default(),
            RetryPolicy::none(),
        )
        .with_system_prompt("Auditeur interne");
        assert_eq!(requester.system_prompt(), "Auditeur interne");
    }
}

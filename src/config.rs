use crate::error::{ActionPlanError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_GUIDANCE_URL: &str = "https://raw.githubusercontent.com/M00N69/Action-planGroq/main/Guide%20Checklist_IFS%20Food%20V%208%20-%20CHECKLIST.csv";

/// Where the header row of the action plan sits.
///
/// Action plans exported from the IFS database put their header on the 12th
/// sheet row, but older exports are off by one. The offset is never implied.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HeaderLocation {
    /// Zero-based row index of the header.
    Fixed(usize),
    /// Use the first row, among the first `within`, that carries every required column.
    Search { within: usize },
}

impl Default for HeaderLocation {
    fn default() -> Self {
        HeaderLocation::Fixed(11)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ColumnMapping {
    pub requirement_no: String,
    pub requirement_text: String,
    /// Optional: plans without a notation column still load.
    pub score: Option<String>,
    pub explanation: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            requirement_no: "requirementNo".to_string(),
            requirement_text: "requirementText".to_string(),
            score: Some("requirementScore".to_string()),
            explanation: "requirementExplanation".to_string(),
        }
    }
}

impl ColumnMapping {
    pub fn required(&self) -> Vec<&str> {
        vec![
            self.requirement_no.as_str(),
            self.requirement_text.as_str(),
            self.explanation.as_str(),
        ]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum SafetyThreshold {
    BlockNone,
    BlockOnlyHigh,
    #[default]
    BlockMediumAndAbove,
    BlockLowAndAbove,
}

impl SafetyThreshold {
    pub fn as_api_str(self) -> &'static str {
        match self {
            SafetyThreshold::BlockNone => "BLOCK_NONE",
            SafetyThreshold::BlockOnlyHigh => "BLOCK_ONLY_HIGH",
            SafetyThreshold::BlockMediumAndAbove => "BLOCK_MEDIUM_AND_ABOVE",
            SafetyThreshold::BlockLowAndAbove => "BLOCK_LOW_AND_ABOVE",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
    /// Ask the provider for a JSON object instead of headed prose.
    pub structured_output: bool,
    pub safety_threshold: SafetyThreshold,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-flash".to_string(),
            temperature: 0.0,
            max_output_tokens: 1000,
            structured_output: false,
            safety_threshold: SafetyThreshold::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    #[default]
    Fixed,
    Exponential,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts per request, the first one included. 1 disables retries.
    pub max_attempts: usize,
    pub delay_ms: u64,
    pub backoff: Backoff,
    /// "Please continue" follow-ups sent when a reply is missing sections.
    pub continuation_attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay_ms: 2_000,
            backoff: Backoff::Fixed,
            continuation_attempts: 0,
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            delay_ms: 0,
            backoff: Backoff::Fixed,
            continuation_attempts: 0,
        }
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn delay_after(&self, attempt: usize) -> Duration {
        let base = self.delay_ms;
        let millis = match self.backoff {
            Backoff::Fixed => base,
            Backoff::Exponential => {
                let shift = attempt.saturating_sub(1).min(16) as u32;
                base.saturating_mul(1u64 << shift)
            }
        };
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// One request per non-conformity.
    #[default]
    PerItem,
    /// One combined request, split back into one slice per non-conformity.
    Batch,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub header: HeaderLocation,
    pub columns: ColumnMapping,
    pub guidance_url: Option<String>,
    pub generation: GenerationSettings,
    pub retry: RetryPolicy,
    /// Fixed pause between two sequential provider calls.
    pub throttle_ms: u64,
    pub mode: ProcessingMode,
    /// Appends the "detailed analysis" instruction to every prompt.
    pub detailed_analysis: bool,
}

impl PipelineConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let HeaderLocation::Search { within: 0 } = self.header {
            return Err(ActionPlanError::InvalidConfig(
                "header search window must cover at least one row".to_string(),
            ));
        }
        if self.columns.required().iter().any(|c| c.trim().is_empty()) {
            return Err(ActionPlanError::InvalidConfig(
                "column names must not be empty".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ActionPlanError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err(ActionPlanError::InvalidConfig(format!(
                "temperature {} is outside 0.0..=2.0",
                self.generation.temperature
            )));
        }
        if self.generation.max_output_tokens == 0 {
            return Err(ActionPlanError::InvalidConfig(
                "max_output_tokens must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn guidance_url(&self) -> &str {
        self.guidance_url.as_deref().unwrap_or(DEFAULT_GUIDANCE_URL)
    }

    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }

    pub fn with_header(mut self, header: HeaderLocation) -> Self {
        self.header = header;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.generation.model = model.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_throttle_ms(mut self, throttle_ms: u64) -> Self {
        self.throttle_ms = throttle_ms;
        self
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_structured_output(mut self, enabled: bool) -> Self {
        self.generation.structured_output = enabled;
        self
    }

    pub fn with_detailed_analysis(mut self, enabled: bool) -> Self {
        self.detailed_analysis = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_falls_back_to_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{ "header": { "fixed": 12 }, "retry": { "max_attempts": 3 } }"#,
        )
        .unwrap();

        assert_eq!(config.header, HeaderLocation::Fixed(12));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.continuation_attempts, 0);
        assert_eq!(config.columns.requirement_no, "requirementNo");
        assert_eq!(config.mode, ProcessingMode::PerItem);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_header_search_round_trips_through_json() {
        let config = PipelineConfig::default().with_header(HeaderLocation::Search { within: 20 });
        let json = serde_json::to_string(&config).unwrap();
        let back: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.header, HeaderLocation::Search { within: 20 });
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = PipelineConfig::default().with_retry(RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        });
        assert!(matches!(
            config.validate(),
            Err(ActionPlanError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_exponential_backoff_doubles() {
        let policy = RetryPolicy {
            max_attempts: 4,
            delay_ms: 500,
            backoff: Backoff::Exponential,
            continuation_attempts: 0,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_after(3), Duration::from_millis(2000));
    }

    #[test]
    fn test_fixed_backoff_is_constant() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(1), policy.delay_after(5));
    }
}

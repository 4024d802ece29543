use crate::config::{PipelineConfig, ProcessingMode};
use crate::error::{ActionPlanError, Result};
use crate::guidance::GuidanceTable;
use crate::llm::client::{GenerationRequest, TextGenerator};
use crate::llm::parser::{parse_marked_sections, split_batch_response, ParsedRecommendation};
use crate::llm::prompts::{build_batch_prompt, build_recommendation_prompt, PromptOptions};
use crate::llm::requester::{send_event, RecommendationRequester};
use crate::llm::types::PipelineEvent;
use crate::report::Report;
use crate::schema::{GuidanceEntry, NonConformity, Recommendation};
use crate::session::{ItemState, ReviewAction, ReviewSession};
use log::{debug, info, warn};
use std::time::Duration;
use tokio::sync::mpsc::Sender;
use tokio::time::sleep;

/// Result of a run. A quota error stops the run early; what was processed
/// before it is kept.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub report: Report,
    /// Message of the quota error that stopped the run, if any.
    pub halted: Option<String>,
    /// Indices of items that were never sent.
    pub unprocessed: Vec<usize>,
}

impl RunSummary {
    pub fn is_complete(&self) -> bool {
        self.halted.is_none()
    }
}

/// Drives loader output through lookup, prompt, request and parse, and
/// collects the results into a [`Report`].
pub struct ActionPlanPipeline<G> {
    requester: RecommendationRequester<G>,
    guidance: GuidanceTable,
    options: PromptOptions,
    mode: ProcessingMode,
    throttle: Duration,
    report_title: Option<String>,
}

impl<G: TextGenerator> ActionPlanPipeline<G> {
    pub fn new(generator: G, guidance: GuidanceTable, config: &PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            requester: RecommendationRequester::new(
                generator,
                config.generation.clone(),
                config.retry.clone(),
            ),
            guidance,
            options: PromptOptions {
                detailed_analysis: config.detailed_analysis,
                structured_output: config.generation.structured_output,
            },
            mode: config.mode,
            throttle: config.throttle(),
            report_title: None,
        })
    }

    pub fn with_report_title(mut self, title: impl Into<String>) -> Self {
        self.report_title = Some(title.into());
        self
    }

    /// Replaces the system prompt for both per-item and batch requests.
    pub fn with_system_prompt(self, prompt: impl Into<String>) -> Self {
        Self {
            requester: self.requester.with_system_prompt(prompt),
            ..self
        }
    }

    pub fn requester(&self) -> &RecommendationRequester<G> {
        &self.requester
    }

    fn new_report(&self) -> Report {
        match &self.report_title {
            Some(title) => Report::new(title.clone()),
            None => Report::default(),
        }
    }

    fn guidance_for(&self, nc: &NonConformity) -> Option<&GuidanceEntry> {
        let found = self.guidance.lookup(&nc.requirement_no);
        if found.is_none() && !self.guidance.is_empty() {
            warn!(
                "No guidance found for requirement {}, prompting without it",
                nc.requirement_no
            );
        }
        found
    }

    /// Builds the prompt for one item and returns the parsed reply.
    pub async fn recommend(
        &self,
        nc: &NonConformity,
        progress: &Option<Sender<PipelineEvent>>,
    ) -> Result<ParsedRecommendation> {
        let prompt = build_recommendation_prompt(nc, self.guidance_for(nc), self.options);
        self.requester.recommend(&prompt, progress).await
    }

    pub async fn run(
        &self,
        items: &[NonConformity],
        progress: Option<Sender<PipelineEvent>>,
    ) -> RunSummary {
        send_event(&progress, PipelineEvent::Starting { total: items.len() }).await;
        info!(
            "Generating recommendations for {} non-conformities ({:?} mode)",
            items.len(),
            self.mode
        );

        let summary = match self.mode {
            ProcessingMode::PerItem => self.run_per_item(items, &progress).await,
            ProcessingMode::Batch => self.run_batch(items, &progress).await,
        };

        send_event(
            &progress,
            PipelineEvent::Finished {
                processed: summary.report.len(),
                skipped: summary.unprocessed.len(),
            },
        )
        .await;
        info!(
            "Run finished: {} processed, {} not processed",
            summary.report.len(),
            summary.unprocessed.len()
        );
        summary
    }

    async fn run_per_item(
        &self,
        items: &[NonConformity],
        progress: &Option<Sender<PipelineEvent>>,
    ) -> RunSummary {
        let mut report = self.new_report();
        let mut halted = None;
        let mut unprocessed = Vec::new();

        for (index, nc) in items.iter().enumerate() {
            if index > 0 && !self.throttle.is_zero() {
                send_event(
                    progress,
                    PipelineEvent::Throttling {
                        millis: self.throttle.as_millis() as u64,
                    },
                )
                .await;
                sleep(self.throttle).await;
            }

            send_event(
                progress,
                PipelineEvent::Requesting {
                    index,
                    requirement_no: nc.requirement_no.clone(),
                },
            )
            .await;

            match self.recommend(nc, progress).await {
                Ok(parsed) => {
                    for field in &parsed.missing {
                        send_event(progress, PipelineEvent::MissingField { index, field: *field })
                            .await;
                    }
                    report.push(nc.clone(), parsed.recommendation);
                }
                Err(e) if e.is_quota_exceeded() => {
                    warn!(
                        "Quota exhausted on requirement {}, stopping the run",
                        nc.requirement_no
                    );
                    send_event(
                        progress,
                        PipelineEvent::QuotaExhausted {
                            index,
                            message: e.to_string(),
                        },
                    )
                    .await;
                    halted = Some(e.to_string());
                    unprocessed = (index..items.len()).collect();
                    break;
                }
                Err(e) => {
                    self.substitute_placeholder(&mut report, nc, index, &e, progress)
                        .await;
                }
            }

            send_event(progress, PipelineEvent::ItemCompleted { index }).await;
        }

        RunSummary {
            report,
            halted,
            unprocessed,
        }
    }

    async fn run_batch(
        &self,
        items: &[NonConformity],
        progress: &Option<Sender<PipelineEvent>>,
    ) -> RunSummary {
        let mut report = self.new_report();
        if items.is_empty() {
            return RunSummary {
                report,
                halted: None,
                unprocessed: Vec::new(),
            };
        }

        let pairs: Vec<(&NonConformity, Option<&GuidanceEntry>)> = items
            .iter()
            .map(|nc| (nc, self.guidance_for(nc)))
            .collect();
        let prompt = build_batch_prompt(&pairs, self.options);
        // Batch replies are split on headings, so JSON mode stays off here.
        let mut settings = self.requester.settings().clone();
        if settings.structured_output {
            debug!("Structured output is not used for batch requests");
            settings.structured_output = false;
        }
        let request = GenerationRequest::new(prompt, settings)
            .with_system(self.requester.system_prompt());

        send_event(
            progress,
            PipelineEvent::Requesting {
                index: 0,
                requirement_no: items[0].requirement_no.clone(),
            },
        )
        .await;

        match self.requester.send(&request, progress).await {
            Ok(text) => {
                let slices = split_batch_response(&text, items.len());
                for (index, (nc, slice)) in items.iter().zip(slices).enumerate() {
                    let parsed = parse_marked_sections(&slice);
                    for field in &parsed.missing {
                        send_event(progress, PipelineEvent::MissingField { index, field: *field })
                            .await;
                    }
                    report.push(nc.clone(), parsed.recommendation);
                    send_event(progress, PipelineEvent::ItemCompleted { index }).await;
                }
                RunSummary {
                    report,
                    halted: None,
                    unprocessed: Vec::new(),
                }
            }
            Err(e) if e.is_quota_exceeded() => {
                send_event(
                    progress,
                    PipelineEvent::QuotaExhausted {
                        index: 0,
                        message: e.to_string(),
                    },
                )
                .await;
                RunSummary {
                    report,
                    halted: Some(e.to_string()),
                    unprocessed: (0..items.len()).collect(),
                }
            }
            Err(e) => {
                for (index, nc) in items.iter().enumerate() {
                    self.substitute_placeholder(&mut report, nc, index, &e, progress)
                        .await;
                }
                RunSummary {
                    report,
                    halted: None,
                    unprocessed: Vec::new(),
                }
            }
        }
    }

    async fn substitute_placeholder(
        &self,
        report: &mut Report,
        nc: &NonConformity,
        index: usize,
        error: &ActionPlanError,
        progress: &Option<Sender<PipelineEvent>>,
    ) {
        warn!(
            "No recommendation for requirement {}: {}",
            nc.requirement_no, error
        );
        send_event(
            progress,
            PipelineEvent::PlaceholderUsed {
                index,
                reason: error.to_string(),
            },
        )
        .await;
        report.push(nc.clone(), Recommendation::placeholder());
    }

    /// Drafts a recommendation for the item under review.
    ///
    /// Returns the `Deliver` action to apply to the session. Quota errors are
    /// returned so the caller keeps its session untouched; other provider
    /// failures deliver the placeholder.
    pub async fn draft_for_current(
        &self,
        session: &ReviewSession,
        progress: &Option<Sender<PipelineEvent>>,
    ) -> Result<ReviewAction> {
        let (nc, state) = session.current().ok_or_else(|| ActionPlanError::InvalidTransition {
            state: "complete".to_string(),
            action: "deliver".to_string(),
        })?;
        if *state != ItemState::AwaitingRecommendation {
            return Err(ActionPlanError::InvalidTransition {
                state: state.to_string(),
                action: "deliver".to_string(),
            });
        }

        match self.recommend(nc, progress).await {
            Ok(parsed) => Ok(ReviewAction::Deliver(parsed.recommendation)),
            Err(e) if e.is_quota_exceeded() => Err(e),
            Err(e) => {
                warn!(
                    "No recommendation for requirement {}: {}",
                    nc.requirement_no, e
                );
                Ok(ReviewAction::Deliver(Recommendation::placeholder()))
            }
        }
    }
}

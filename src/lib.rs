//! # IFS Action Plan
//!
//! Drafts responses to IFS Food v8 audit non-conformities with a hosted LLM.
//!
//! ## Core Concepts
//!
//! - **Action plan**: the spreadsheet of non-conformities an audited site must answer,
//!   loaded into [`NonConformity`] rows by [`load_action_plan`]
//! - **Guidance**: the IFS checklist, matched to each requirement by substring in [`GuidanceTable::lookup`]
//! - **Recommendation**: the correction, required evidence and corrective action drafted for
//!   one finding, parsed from the model's reply by [`llm::parse_response`]
//! - **Report**: the accepted recommendations, exportable as CSV, text, XLSX, DOCX or PDF
//!
//! Provider clients (Gemini, Groq) live behind the `providers` feature. Everything else
//! runs against the [`llm::TextGenerator`] trait.
//!
//! ## Example
//!
//! ```rust,ignore
//! use ifs_action_plan::*;
//! use ifs_action_plan::llm::GeminiClient;
//!
//! let config = PipelineConfig::default().with_header(HeaderLocation::Search { within: 20 });
//! let table = Table::from_workbook_path("plan.xlsx")?;
//! let items = load_action_plan(&table, config.header, &config.columns)?;
//! let guidance = GuidanceTable::fetch(config.guidance_url()).await?;
//!
//! let pipeline = ActionPlanPipeline::new(GeminiClient::from_env()?, guidance, &config)?;
//! let summary = pipeline.run(&items, None).await;
//! std::fs::write("plan.csv", summary.report.to_csv()?)?;
//! ```

pub mod config;
pub mod error;
pub mod guidance;
pub mod llm;
pub mod loader;
pub mod pipeline;
pub mod report;
pub mod schema;
pub mod session;

pub use config::*;
pub use error::{ActionPlanError, Result};
pub use guidance::GuidanceTable;
pub use loader::{load_action_plan, Table};
pub use pipeline::{ActionPlanPipeline, RunSummary};
pub use report::{ExportFormat, Report};
pub use schema::*;
pub use session::{ItemState, ReviewAction, ReviewSession};

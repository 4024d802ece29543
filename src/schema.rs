use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One row of the uploaded action plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NonConformity {
    /// Requirement number as written in the action plan (e.g. "4.5" or "1.2.1").
    pub requirement_no: String,
    /// Requirement text from the IFS Food v8 standard.
    pub requirement_text: String,
    /// Notation given by the auditor (B, C, D, Major...). Not every export carries it.
    pub score: Option<String>,
    /// Auditor's explanation of the finding.
    pub explanation: String,
}

impl NonConformity {
    pub fn new(
        requirement_no: impl Into<String>,
        requirement_text: impl Into<String>,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            requirement_no: requirement_no.into(),
            requirement_text: requirement_text.into(),
            score: None,
            explanation: explanation.into(),
        }
    }

    #[must_use]
    pub fn with_score(mut self, score: impl Into<String>) -> Self {
        self.score = Some(score.into());
        self
    }
}

/// One row of the IFS guidance checklist.
///
/// `requirement_id` is matched as a substring, it is not a unique key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GuidanceEntry {
    #[serde(rename = "NUM_REQ")]
    pub requirement_id: String,
    #[serde(rename = "Good practice", default)]
    pub good_practice: String,
    #[serde(rename = "Elements to check", default)]
    pub elements_to_check: String,
    #[serde(rename = "Example questions", default)]
    pub example_questions: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default, JsonSchema)]
pub struct Recommendation {
    #[schemars(description = "Correction immédiate : ce qui doit être fait tout de suite pour traiter le constat.")]
    #[serde(default)]
    pub correction: String,

    #[schemars(description = "Preuves requises : les documents ou enregistrements qui démontrent la correction.")]
    #[serde(default)]
    pub evidence: String,

    #[schemars(description = "Actions correctives : les mesures de fond qui traitent la cause racine.")]
    #[serde(default)]
    pub corrective_action: String,
}

pub const PLACEHOLDER_TEXT: &str = "Aucune recommandation générée";

impl Recommendation {
    pub fn new(
        correction: impl Into<String>,
        evidence: impl Into<String>,
        corrective_action: impl Into<String>,
    ) -> Self {
        Self {
            correction: correction.into(),
            evidence: evidence.into(),
            corrective_action: corrective_action.into(),
        }
    }

    /// Substituted when the provider fails or replies with nothing usable.
    pub fn placeholder() -> Self {
        Self::new(PLACEHOLDER_TEXT, PLACEHOLDER_TEXT, PLACEHOLDER_TEXT)
    }

    pub fn field(&self, field: RecommendationField) -> &str {
        match field {
            RecommendationField::Correction => &self.correction,
            RecommendationField::Evidence => &self.evidence,
            RecommendationField::CorrectiveAction => &self.corrective_action,
        }
    }

    pub fn missing_fields(&self) -> Vec<RecommendationField> {
        RecommendationField::ALL
            .into_iter()
            .filter(|f| self.field(*f).trim().is_empty())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing_fields().is_empty()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationField {
    Correction,
    Evidence,
    CorrectiveAction,
}

impl RecommendationField {
    pub const ALL: [RecommendationField; 3] = [
        RecommendationField::Correction,
        RecommendationField::Evidence,
        RecommendationField::CorrectiveAction,
    ];

    /// Section heading the model is asked to echo for this field.
    pub fn marker(self) -> &'static str {
        match self {
            RecommendationField::Correction => "Correction immédiate",
            RecommendationField::Evidence => "Preuves requises",
            RecommendationField::CorrectiveAction => "Actions Correctives",
        }
    }
}

impl fmt::Display for RecommendationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.marker())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    /// All three sections were found in the reply.
    Complete,
    /// At least one section was missing from the reply.
    Incomplete,
    /// The provider failed or returned nothing; placeholder text was used.
    Placeholder,
}

/// A non-conformity joined with its recommendation, ready for export.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportRow {
    pub non_conformity: NonConformity,
    pub recommendation: Recommendation,
    pub status: RecommendationStatus,
}

impl ReportRow {
    pub fn new(non_conformity: NonConformity, recommendation: Recommendation) -> Self {
        let status = if recommendation == Recommendation::placeholder() {
            RecommendationStatus::Placeholder
        } else if recommendation.is_complete() {
            RecommendationStatus::Complete
        } else {
            RecommendationStatus::Incomplete
        };
        Self {
            non_conformity,
            recommendation,
            status,
        }
    }
}

//! One-item-at-a-time review of an action plan.
//!
//! The session is a plain value. Every user action goes through
//! [`ReviewSession::apply`], which consumes the session and returns the next
//! one, so callers hold the state explicitly instead of sharing it.

use crate::error::{ActionPlanError, Result};
use crate::report::Report;
use crate::schema::{NonConformity, Recommendation};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    /// Waiting for the user to ask for (another) recommendation.
    AwaitingRecommendation,
    /// A recommendation is shown and can be accepted or retried.
    Displaying(Recommendation),
    Accepted(Recommendation),
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemState::AwaitingRecommendation => f.write_str("awaiting a recommendation"),
            ItemState::Displaying(_) => f.write_str("displaying a recommendation"),
            ItemState::Accepted(_) => f.write_str("accepted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewAction {
    /// "Obtenir Recommandation": a recommendation came back for the current item.
    Deliver(Recommendation),
    /// "Nouvel essai": discard the shown recommendation.
    Retry,
    /// "Accepter": keep the shown recommendation and move to the next item.
    Accept,
}

impl ReviewAction {
    fn label(&self) -> &'static str {
        match self {
            ReviewAction::Deliver(_) => "deliver",
            ReviewAction::Retry => "retry",
            ReviewAction::Accept => "accept",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewSession {
    items: Vec<NonConformity>,
    states: Vec<ItemState>,
    cursor: usize,
}

impl ReviewSession {
    pub fn new(items: Vec<NonConformity>) -> Self {
        let states = vec![ItemState::AwaitingRecommendation; items.len()];
        Self {
            items,
            states,
            cursor: 0,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The item under review, or `None` once everything is accepted.
    pub fn current(&self) -> Option<(&NonConformity, &ItemState)> {
        Some((self.items.get(self.cursor)?, self.states.get(self.cursor)?))
    }

    pub fn state(&self, index: usize) -> Option<&ItemState> {
        self.states.get(index)
    }

    /// Terminal state: every item has been accepted.
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.items.len()
    }

    pub fn accepted_count(&self) -> usize {
        self.states
            .iter()
            .filter(|s| matches!(s, ItemState::Accepted(_)))
            .count()
    }

    pub fn apply(mut self, action: ReviewAction) -> Result<Self> {
        let Some(state) = self.states.get(self.cursor).cloned() else {
            return Err(ActionPlanError::InvalidTransition {
                state: "complete".to_string(),
                action: action.label().to_string(),
            });
        };

        let next = match (state, action) {
            (ItemState::AwaitingRecommendation, ReviewAction::Deliver(rec)) => {
                ItemState::Displaying(rec)
            }
            (ItemState::Displaying(_), ReviewAction::Retry) => ItemState::AwaitingRecommendation,
            (ItemState::Displaying(rec), ReviewAction::Accept) => {
                self.states[self.cursor] = ItemState::Accepted(rec);
                self.cursor += 1;
                return Ok(self);
            }
            (state, action) => {
                return Err(ActionPlanError::InvalidTransition {
                    state: state.to_string(),
                    action: action.label().to_string(),
                })
            }
        };

        self.states[self.cursor] = next;
        Ok(self)
    }

    /// Bulk export is only offered once every item is accepted.
    pub fn into_report(self, report: Report) -> Result<Report> {
        if !self.is_complete() {
            return Err(ActionPlanError::InvalidTransition {
                state: format!(
                    "reviewing ({} of {} accepted)",
                    self.accepted_count(),
                    self.items.len()
                ),
                action: "export".to_string(),
            });
        }

        let mut report = report;
        for (item, state) in self.items.into_iter().zip(self.states) {
            if let ItemState::Accepted(rec) = state {
                report.push(item, rec);
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ReviewSession {
        ReviewSession::new(vec![
            NonConformity::new("4.5", "Traceability", "No batch records"),
            NonConformity::new("2.1.3", "Document control", "Obsolete SOP"),
        ])
    }

    fn rec(text: &str) -> Recommendation {
        Recommendation::new(text, "evidence", "action")
    }

    #[test]
    fn test_full_walkthrough_with_retry() {
        let session = session()
            .apply(ReviewAction::Deliver(rec("first try")))
            .unwrap()
            .apply(ReviewAction::Retry)
            .unwrap();
        assert_eq!(session.state(0), Some(&ItemState::AwaitingRecommendation));

        let session = session
            .apply(ReviewAction::Deliver(rec("second try")))
            .unwrap()
            .apply(ReviewAction::Accept)
            .unwrap();
        assert_eq!(session.cursor(), 1);
        assert_eq!(session.state(0), Some(&ItemState::Accepted(rec("second try"))));

        let session = session
            .apply(ReviewAction::Deliver(rec("other")))
            .unwrap()
            .apply(ReviewAction::Accept)
            .unwrap();
        assert!(session.is_complete());
        assert!(session.current().is_none());

        let report = session.into_report(Report::default()).unwrap();
        assert_eq!(report.len(), 2);
        assert_eq!(report.rows()[0].recommendation.correction, "second try");
        assert_eq!(report.rows()[1].non_conformity.requirement_no, "2.1.3");
    }

    #[test]
    fn test_accept_requires_a_displayed_recommendation() {
        let err = session().apply(ReviewAction::Accept).unwrap_err();
        assert!(matches!(err, ActionPlanError::InvalidTransition { .. }));
    }

    #[test]
    fn test_deliver_twice_is_rejected() {
        let err = session()
            .apply(ReviewAction::Deliver(rec("a")))
            .unwrap()
            .apply(ReviewAction::Deliver(rec("b")))
            .unwrap_err();
        assert!(err.to_string().contains("displaying"));
    }

    #[test]
    fn test_export_before_completion_is_rejected() {
        let session = session()
            .apply(ReviewAction::Deliver(rec("a")))
            .unwrap()
            .apply(ReviewAction::Accept)
            .unwrap();
        assert!(session.into_report(Report::default()).is_err());
    }

    #[test]
    fn test_actions_after_completion_are_rejected() {
        let session = ReviewSession::new(vec![]);
        assert!(session.is_complete());
        assert!(session.apply(ReviewAction::Retry).is_err());
    }
}

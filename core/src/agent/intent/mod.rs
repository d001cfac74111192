//! Intent & entity extraction
//!
//! Turns a clinician's free-text question into an [`ExtractedEntities`]
//! value: a closed-enumeration [`Intent`], an optional [`PatientReference`]
//! and free [`Parameters`]. Extraction is pure and never fails; anything the
//! rule table does not recognise comes back as [`Intent::Unknown`].

pub mod extractor;
pub mod params;
pub mod reference;
pub mod rules;

use serde::{Deserialize, Serialize};

pub use extractor::IntentExtractor;
pub use params::{ComparisonOp, DateSpec, FilterSpec, QueryAction, QuerySpec, SubTopic};
pub use reference::PatientReference;
pub use rules::{RuleSpec, RuleTable};

/// Closed set of query intents the assistant understands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Intent {
    PatientCount,
    PatientProfile,
    PatientGoals,
    GoalProgress,
    BudgetInfo,
    StrategyInsights,
    SessionEngagement,
    RecordQuery,
    ConversationRecall,
    GeneralQuestion,
    Unknown,
}

/// Where an intent is answered from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntentRoute {
    /// A data-retrieval tool from the registry
    Tool,
    /// Conversation memory recall, no tool call
    Recall,
    /// Free-form language model answer, no tool call
    LanguageModel,
}

impl Intent {
    pub const ALL: [Intent; 11] = [
        Intent::PatientCount,
        Intent::PatientProfile,
        Intent::PatientGoals,
        Intent::GoalProgress,
        Intent::BudgetInfo,
        Intent::StrategyInsights,
        Intent::SessionEngagement,
        Intent::RecordQuery,
        Intent::ConversationRecall,
        Intent::GeneralQuestion,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::PatientCount => "PATIENT_COUNT",
            Intent::PatientProfile => "PATIENT_PROFILE",
            Intent::PatientGoals => "PATIENT_GOALS",
            Intent::GoalProgress => "GOAL_PROGRESS",
            Intent::BudgetInfo => "BUDGET_INFO",
            Intent::StrategyInsights => "STRATEGY_INSIGHTS",
            Intent::SessionEngagement => "SESSION_ENGAGEMENT",
            Intent::RecordQuery => "RECORD_QUERY",
            Intent::ConversationRecall => "CONVERSATION_RECALL",
            Intent::GeneralQuestion => "GENERAL_QUESTION",
            Intent::Unknown => "UNKNOWN",
        }
    }

    pub fn route(&self) -> IntentRoute {
        match self {
            Intent::ConversationRecall => IntentRoute::Recall,
            Intent::GeneralQuestion | Intent::Unknown => IntentRoute::LanguageModel,
            _ => IntentRoute::Tool,
        }
    }

    /// Intents whose tool cannot run without a resolved patient
    pub fn needs_patient(&self) -> bool {
        matches!(
            self,
            Intent::PatientProfile
                | Intent::PatientGoals
                | Intent::GoalProgress
                | Intent::BudgetInfo
                | Intent::StrategyInsights
                | Intent::SessionEngagement
        )
    }

    /// Subject tag used when summarizing and recalling conversation memory
    pub fn topic(&self) -> Option<&'static str> {
        match self {
            Intent::PatientCount | Intent::PatientProfile => Some("patients"),
            Intent::PatientGoals | Intent::GoalProgress => Some("goals"),
            Intent::BudgetInfo => Some("budget"),
            Intent::StrategyInsights => Some("strategies"),
            Intent::SessionEngagement => Some("sessions"),
            Intent::RecordQuery => Some("records"),
            _ => None,
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Free parameters pulled out of the query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<DateSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_topic: Option<SubTopic>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QuerySpec>,
}

impl Parameters {
    pub fn is_empty(&self) -> bool {
        self.date_range.is_none()
            && self.sub_topic.is_none()
            && self.category.is_none()
            && self.query.is_none()
    }
}

/// Result of extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedEntities {
    pub intent: Intent,
    pub patient_reference: Option<PatientReference>,
    /// Reference was carried over from an earlier message ("their goals")
    #[serde(default)]
    pub reference_from_context: bool,
    #[serde(default)]
    pub parameters: Parameters,
}

impl ExtractedEntities {
    pub fn unknown() -> Self {
        Self {
            intent: Intent::Unknown,
            patient_reference: None,
            reference_from_context: false,
            parameters: Parameters::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routes_cover_every_intent() {
        for intent in Intent::ALL {
            let route = intent.route();
            if intent.needs_patient() {
                assert_eq!(route, IntentRoute::Tool, "{} needs a patient but has no tool", intent);
            }
        }
        assert_eq!(Intent::Unknown.route(), IntentRoute::LanguageModel);
        assert_eq!(Intent::ConversationRecall.route(), IntentRoute::Recall);
        assert!(!Intent::PatientCount.needs_patient());
    }

    #[test]
    fn test_intent_serializes_screaming_case() {
        let json = serde_json::to_string(&Intent::PatientGoals).unwrap();
        assert_eq!(json, "\"PATIENT_GOALS\"");
        assert_eq!(Intent::PatientGoals.to_string(), "PATIENT_GOALS");
    }
}

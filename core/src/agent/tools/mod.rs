//! Data-retrieval tools
//!
//! Every tool takes the same [`ToolInput`] and returns a bounded
//! [`ToolOutput`] or a [`ToolError`]. Tools are read-only. Patient-scoped
//! tools resolve the reference first and stop at zero or several matches.
//!
//! # Tools
//! - **patient_census**: total, active and inactive patient counts
//! - **patient_profile**: one patient's record with goal, session and budget highlights
//! - **goal_tracking**: goal status and progress
//! - **budget_tracking**: funding, spending and remaining balance
//! - **strategy_insights**: strategy usage ranked by effectiveness
//! - **session_engagement**: attendance and engagement
//! - **record_query**: structured `where` queries over an allow-listed schema

pub mod budget;
pub mod goals;
pub mod patients;
pub mod policy;
pub mod query;
pub mod registry;
pub mod resolve;
pub mod sessions;
pub mod strategies;

use std::sync::Arc;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::agent::intent::{Parameters, PatientReference};
use crate::clinic::{ClinicData, PatientSummary, RecordFilter};

pub use budget::BudgetReport;
pub use goals::GoalReport;
pub use patients::{CensusReport, ProfileReport};
pub use policy::CallPolicy;
pub use query::RecordReport;
pub use registry::{RegistryError, ToolRegistry, ToolRegistryBuilder};
pub use resolve::PatientResolution;
pub use sessions::EngagementReport;
pub use strategies::StrategyReport;

/// Default number of rows a tool lists
pub const DEFAULT_TOP_N: usize = 5;

/// Uniform tool input
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_reference: Option<PatientReference>,
    #[serde(default)]
    pub parameters: Parameters,
}

impl ToolInput {
    pub fn new(patient_reference: Option<PatientReference>, parameters: Parameters) -> Self {
        Self {
            patient_reference,
            parameters,
        }
    }

    pub fn with_reference(&self, reference: PatientReference) -> Self {
        Self {
            patient_reference: Some(reference),
            parameters: self.parameters.clone(),
        }
    }
}

/// Why a tool produced no output. Every variant is an observation for the
/// agent loop, never a crash.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolError {
    #[error("no patient matches {reference}")]
    NotFound { reference: String },

    #[error("{} patients match {reference}", .candidates.len())]
    Ambiguous {
        reference: String,
        candidates: Vec<PatientSummary>,
    },

    #[error("this request needs a patient")]
    PatientRequired,

    #[error("clinic data unavailable while running {operation}: {message}")]
    Upstream { operation: String, message: String },

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("invalid request: {message}")]
    Validation { message: String },
}

impl ToolError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Upstream and timeout failures may succeed if the same call is repeated
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::Timeout { .. })
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Ambiguous { .. } => "AMBIGUOUS",
            Self::PatientRequired => "PATIENT_REQUIRED",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Validation { .. } => "VALIDATION_ERROR",
        }
    }
}

/// Tool-specific report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolData {
    Census(CensusReport),
    Profile(ProfileReport),
    Goals(GoalReport),
    Budget(BudgetReport),
    Strategies(StrategyReport),
    Engagement(EngagementReport),
    Records(RecordReport),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool: Tool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient: Option<PatientSummary>,
    pub data: ToolData,
}

impl ToolOutput {
    /// Plain-text rendering of the report
    pub fn render(&self) -> String {
        let subject = self
            .patient
            .as_ref()
            .map(|p| p.label())
            .unwrap_or_default();
        match &self.data {
            ToolData::Census(report) => report.render(),
            ToolData::Profile(report) => report.render(),
            ToolData::Goals(report) => report.render(&subject),
            ToolData::Budget(report) => report.render(&subject),
            ToolData::Strategies(report) => report.render(&subject),
            ToolData::Engagement(report) => report.render(&subject),
            ToolData::Records(report) => report.render(self.patient.as_ref()),
        }
    }
}

/// Everything a tool needs to run
#[derive(Clone)]
pub struct ToolContext {
    pub data: Arc<dyn ClinicData>,
    pub policy: CallPolicy,
    /// Date relative ranges are resolved against
    pub today: NaiveDate,
    pub top_n: usize,
}

impl ToolContext {
    pub fn new(data: Arc<dyn ClinicData>, policy: CallPolicy) -> Self {
        Self {
            data,
            policy,
            today: Local::now().date_naive(),
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = today;
        self
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n.max(1);
        self
    }

    /// Listing filter for the request's date range and category
    pub fn filter(&self, parameters: &Parameters) -> RecordFilter {
        RecordFilter {
            range: parameters.date_range.map(|spec| spec.resolve(self.today)),
            category: parameters.category.clone(),
        }
    }
}

/// The closed set of tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    PatientCensus,
    PatientProfile,
    GoalTracking,
    BudgetTracking,
    StrategyInsights,
    SessionEngagement,
    RecordQuery,
}

impl Tool {
    pub const ALL: [Tool; 7] = [
        Tool::PatientCensus,
        Tool::PatientProfile,
        Tool::GoalTracking,
        Tool::BudgetTracking,
        Tool::StrategyInsights,
        Tool::SessionEngagement,
        Tool::RecordQuery,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Tool::PatientCensus => "patient_census",
            Tool::PatientProfile => "patient_profile",
            Tool::GoalTracking => "goal_tracking",
            Tool::BudgetTracking => "budget_tracking",
            Tool::StrategyInsights => "strategy_insights",
            Tool::SessionEngagement => "session_engagement",
            Tool::RecordQuery => "record_query",
        }
    }

    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|t| t.name() == name.trim())
    }

    pub fn description(&self) -> &'static str {
        match self {
            Tool::PatientCensus => "Count patients on record, split into active and inactive",
            Tool::PatientProfile => "Show one patient's record with goal, session and budget highlights",
            Tool::GoalTracking => "List a patient's goals with status and progress",
            Tool::BudgetTracking => "Summarize a patient's funding, spending and remaining balance",
            Tool::StrategyInsights => "Rank the strategies used with a patient by effectiveness",
            Tool::SessionEngagement => "Summarize a patient's session attendance and engagement",
            Tool::RecordQuery => "Run a structured list/count query over patients, goals, sessions, budget items or strategies",
        }
    }

    /// Example input for the debug invocation surface
    pub fn usage(&self) -> &'static str {
        match self {
            Tool::PatientCensus => r#"{}"#,
            Tool::RecordQuery => {
                r#"{"patient_reference":{"kind":"identifier","value":"456789"},"parameters":{"query":{"action":"count","entity":"sessions","filters":[{"field":"engagement","op":"gte","value":"4"}]}}}"#
            }
            Tool::BudgetTracking => {
                r#"{"patient_reference":{"kind":"name","value":"Liam O'Brien"},"parameters":{"date_range":{"kind":"this_year"}}}"#
            }
            _ => r#"{"patient_reference":{"kind":"identifier","value":"456789"}}"#,
        }
    }

    pub fn requires_patient(&self) -> bool {
        !matches!(self, Tool::PatientCensus | Tool::RecordQuery)
    }

    pub async fn execute(&self, ctx: &ToolContext, input: &ToolInput) -> Result<ToolOutput, ToolError> {
        match self {
            Tool::PatientCensus => patients::census(ctx).await,
            Tool::PatientProfile => patients::profile(ctx, input).await,
            Tool::GoalTracking => goals::track(ctx, input).await,
            Tool::BudgetTracking => budget::track(ctx, input).await,
            Tool::StrategyInsights => strategies::insights(ctx, input).await,
            Tool::SessionEngagement => sessions::engagement(ctx, input).await,
            Tool::RecordQuery => query::run(ctx, input).await,
        }
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Average of the present values
pub(crate) fn average(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for tool in Tool::ALL {
            assert_eq!(Tool::from_name(tool.name()), Some(tool));
            let input: ToolInput = serde_json::from_str(tool.usage()).unwrap();
            assert_eq!(input.patient_reference.is_some(), tool.requires_patient() || tool == Tool::RecordQuery);
        }
        assert_eq!(Tool::from_name("shell"), None);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ToolError::PatientRequired.code(), "PATIENT_REQUIRED");
        assert!(ToolError::Timeout {
            operation: "list_goals".to_string(),
            after_ms: 10
        }
        .is_transient());
        assert!(!ToolError::validation("bad field").is_transient());

        let err = ToolError::Ambiguous {
            reference: "the name \"John\"".to_string(),
            candidates: vec![],
        };
        assert_eq!(err.to_string(), "0 patients match the name \"John\"");
    }

    #[test]
    fn test_average() {
        assert_eq!(average([4.0, 5.0].into_iter()), Some(4.5));
        assert_eq!(average(std::iter::empty()), None);
    }
}

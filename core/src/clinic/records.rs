//! Clinic record types
//!
//! Plain data returned by the clinic data collaborators. These mirror what the
//! practice-management store keeps; the assistant never mutates them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Primary key of a patient record
pub type PatientId = u64;

/// Canonical patient record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    /// Clinic record number, usually six digits
    pub identifier: String,
    pub name: String,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub clinician: Option<String>,
    #[serde(default)]
    pub enrolled_on: Option<NaiveDate>,
}

fn default_true() -> bool {
    true
}

impl Patient {
    pub fn summary(&self) -> PatientSummary {
        PatientSummary {
            id: self.id,
            identifier: self.identifier.clone(),
            name: self.name.clone(),
        }
    }

    /// Display label used in answers, e.g. `Amira Radwan (#563004)`
    pub fn label(&self) -> String {
        format!("{} (#{})", self.name, self.identifier)
    }
}

/// Minimal patient view used for candidates and traces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientSummary {
    pub id: PatientId,
    pub identifier: String,
    pub name: String,
}

impl PatientSummary {
    pub fn label(&self) -> String {
        format!("{} (#{})", self.name, self.identifier)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    NotStarted,
    InProgress,
    Achieved,
    Discontinued,
}

impl GoalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalStatus::NotStarted => "not started",
            GoalStatus::InProgress => "in progress",
            GoalStatus::Achieved => "achieved",
            GoalStatus::Discontinued => "discontinued",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "not started" | "new" | "pending" => Some(GoalStatus::NotStarted),
            "in progress" | "active" | "ongoing" => Some(GoalStatus::InProgress),
            "achieved" | "met" | "complete" | "completed" | "done" => Some(GoalStatus::Achieved),
            "discontinued" | "dropped" | "closed" => Some(GoalStatus::Discontinued),
            _ => None,
        }
    }
}

/// Therapy goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: u64,
    pub patient_id: PatientId,
    pub title: String,
    pub category: String,
    pub status: GoalStatus,
    /// Percent complete, 0..=100
    pub progress: u8,
    pub created_on: NaiveDate,
    #[serde(default)]
    pub target_date: Option<NaiveDate>,
}

/// Funded expense against a patient's plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetItem {
    pub id: u64,
    pub patient_id: PatientId,
    pub category: String,
    pub description: String,
    pub amount: f64,
    pub date: NaiveDate,
}

/// Per-patient funding plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetSettings {
    pub patient_id: PatientId,
    pub total_funding: f64,
    pub plan_start: NaiveDate,
    pub plan_end: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attendance {
    Attended,
    Cancelled,
    NoShow,
}

impl Attendance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Attendance::Attended => "attended",
            Attendance::Cancelled => "cancelled",
            Attendance::NoShow => "no show",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().replace(['_', '-'], " ").as_str() {
            "attended" | "present" | "completed" => Some(Attendance::Attended),
            "cancelled" | "canceled" => Some(Attendance::Cancelled),
            "no show" | "noshow" | "missed" | "absent" => Some(Attendance::NoShow),
            _ => None,
        }
    }
}

/// Therapy session record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TherapySession {
    pub id: u64,
    pub patient_id: PatientId,
    pub date: NaiveDate,
    pub duration_minutes: u32,
    pub attendance: Attendance,
    /// Clinician-rated engagement, 1..=5
    #[serde(default)]
    pub engagement: Option<u8>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// One use of a therapy strategy within a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyUsage {
    pub patient_id: PatientId,
    pub session_id: u64,
    pub strategy: String,
    pub date: NaiveDate,
    /// Clinician-rated effectiveness, 1..=5
    #[serde(default)]
    pub effectiveness: Option<u8>,
}

/// Inclusive calendar range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self { start: end, end: start }
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }

    pub fn describe(&self) -> String {
        format!("{} to {}", self.start.format("%Y-%m-%d"), self.end.format("%Y-%m-%d"))
    }
}

/// Optional filters every listing call accepts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub range: Option<DateRange>,
    pub category: Option<String>,
}

impl RecordFilter {
    pub fn admits_date(&self, date: NaiveDate) -> bool {
        self.range.map_or(true, |r| r.contains(date))
    }

    pub fn admits_category(&self, category: &str) -> bool {
        self.category
            .as_deref()
            .map_or(true, |wanted| category.eq_ignore_ascii_case(wanted.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_date_range_normalizes_order() {
        let range = DateRange::new(d(2024, 6, 30), d(2024, 6, 1));
        assert_eq!(range.start, d(2024, 6, 1));
        assert!(range.contains(d(2024, 6, 30)));
        assert!(!range.contains(d(2024, 7, 1)));
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!(GoalStatus::parse("Achieved"), Some(GoalStatus::Achieved));
        assert_eq!(GoalStatus::parse("in_progress"), Some(GoalStatus::InProgress));
        assert_eq!(GoalStatus::parse("sideways"), None);
        assert_eq!(Attendance::parse("no-show"), Some(Attendance::NoShow));
    }

    #[test]
    fn test_filter_category_is_case_insensitive() {
        let filter = RecordFilter {
            range: None,
            category: Some("Therapy".to_string()),
        };
        assert!(filter.admits_category("therapy"));
        assert!(!filter.admits_category("equipment"));
        assert!(filter.admits_date(d(1999, 1, 1)));
    }
}

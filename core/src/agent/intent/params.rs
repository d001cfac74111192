//! Free parameters: date ranges, sub-topics, categories and structured
//! record queries.

use std::collections::HashMap;

use chrono::{Datelike, Duration, Months, NaiveDate};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Intent;
use crate::clinic::DateRange;

/// A date window as phrased by the clinician, resolved against "today"
/// only when a tool runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DateSpec {
    /// The last N days including today
    LastDays { days: u32 },
    LastMonths { months: u32 },
    ThisWeek,
    ThisMonth,
    ThisYear,
    PreviousWeek,
    PreviousMonth,
    PreviousYear,
    Since { start: NaiveDate },
    Between { start: NaiveDate, end: NaiveDate },
    Year { year: i32 },
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn year_range(year: i32) -> Option<DateRange> {
    Some(DateRange::new(
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

impl DateSpec {
    /// Concrete inclusive range relative to `today`
    pub fn resolve(&self, today: NaiveDate) -> DateRange {
        let monday = today - Duration::days(today.weekday().num_days_from_monday() as i64);
        let resolved = match *self {
            DateSpec::LastDays { days } => {
                let back = days.max(1) as i64 - 1;
                Some(DateRange::new(today - Duration::days(back), today))
            }
            DateSpec::LastMonths { months } => today
                .checked_sub_months(Months::new(months))
                .map(|start| DateRange::new(start, today)),
            DateSpec::ThisWeek => Some(DateRange::new(monday, today)),
            DateSpec::ThisMonth => Some(DateRange::new(first_of_month(today), today)),
            DateSpec::ThisYear => {
                NaiveDate::from_ymd_opt(today.year(), 1, 1).map(|start| DateRange::new(start, today))
            }
            DateSpec::PreviousWeek => {
                let start = monday - Duration::days(7);
                Some(DateRange::new(start, start + Duration::days(6)))
            }
            DateSpec::PreviousMonth => {
                let end = first_of_month(today) - Duration::days(1);
                Some(DateRange::new(first_of_month(end), end))
            }
            DateSpec::PreviousYear => year_range(today.year() - 1),
            DateSpec::Since { start } => Some(DateRange::new(start, today)),
            DateSpec::Between { start, end } => Some(DateRange::new(start, end)),
            DateSpec::Year { year } => year_range(year),
        };
        resolved.unwrap_or_else(|| DateRange::new(today, today))
    }

    pub fn describe(&self) -> String {
        match self {
            DateSpec::LastDays { days: 1 } => "today".to_string(),
            DateSpec::LastDays { days } => format!("the last {} days", days),
            DateSpec::LastMonths { months: 1 } => "the last month".to_string(),
            DateSpec::LastMonths { months } => format!("the last {} months", months),
            DateSpec::ThisWeek => "this week".to_string(),
            DateSpec::ThisMonth => "this month".to_string(),
            DateSpec::ThisYear => "this year".to_string(),
            DateSpec::PreviousWeek => "last week".to_string(),
            DateSpec::PreviousMonth => "last month".to_string(),
            DateSpec::PreviousYear => "last year".to_string(),
            DateSpec::Since { start } => format!("since {}", start.format("%Y-%m-%d")),
            DateSpec::Between { start, end } => format!(
                "between {} and {}",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ),
            DateSpec::Year { year } => format!("in {}", year),
        }
    }

    /// Find a date window in free text
    pub fn parse(text: &str) -> Option<DateSpec> {
        if let Some(caps) = BETWEEN.captures(text) {
            let start = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
            let end = NaiveDate::parse_from_str(&caps[2], "%Y-%m-%d").ok()?;
            return Some(DateSpec::Between { start, end });
        }
        if let Some(caps) = SINCE.captures(text) {
            let start = NaiveDate::parse_from_str(&caps[1], "%Y-%m-%d").ok()?;
            return Some(DateSpec::Since { start });
        }
        if let Some(caps) = LAST_N.captures(text) {
            let n: u32 = caps[1].parse().ok()?;
            return Some(match caps[2].to_lowercase().as_str() {
                "day" => DateSpec::LastDays { days: n },
                "week" => DateSpec::LastDays { days: n.saturating_mul(7) },
                "month" => DateSpec::LastMonths { months: n },
                _ => DateSpec::LastMonths { months: n.saturating_mul(12) },
            });
        }
        if let Some(caps) = PREVIOUS.captures(text) {
            return Some(match caps[1].to_lowercase().as_str() {
                "week" => DateSpec::PreviousWeek,
                "month" => DateSpec::PreviousMonth,
                _ => DateSpec::PreviousYear,
            });
        }
        if let Some(caps) = THIS.captures(text) {
            return Some(match caps[1].to_lowercase().as_str() {
                "week" => DateSpec::ThisWeek,
                "month" => DateSpec::ThisMonth,
                _ => DateSpec::ThisYear,
            });
        }
        if YEAR_TO_DATE.is_match(text) {
            return Some(DateSpec::ThisYear);
        }
        if TODAY.is_match(text) {
            return Some(DateSpec::LastDays { days: 1 });
        }
        if let Some(caps) = IN_YEAR.captures(text) {
            let year: i32 = caps[1].parse().ok()?;
            return Some(DateSpec::Year { year });
        }
        None
    }
}

lazy_static! {
    static ref BETWEEN: Regex = Regex::new(
        r"(?i)\b(?:between|from)\s+(\d{4}-\d{2}-\d{2})\s+(?:and|to|until)\s+(\d{4}-\d{2}-\d{2})\b"
    )
    .expect("valid regex");
    static ref SINCE: Regex =
        Regex::new(r"(?i)\b(?:since|from)\s+(\d{4}-\d{2}-\d{2})\b").expect("valid regex");
    static ref LAST_N: Regex = Regex::new(
        r"(?i)\b(?:last|past|previous)\s+(\d{1,4})\s+(day|week|month|year)s?\b"
    )
    .expect("valid regex");
    static ref PREVIOUS: Regex =
        Regex::new(r"(?i)\b(?:last|previous|past)\s+(week|month|year)\b").expect("valid regex");
    static ref THIS: Regex =
        Regex::new(r"(?i)\b(?:this|current)\s+(week|month|year)\b").expect("valid regex");
    static ref YEAR_TO_DATE: Regex =
        Regex::new(r"(?i)\b(year to date|ytd)\b").expect("valid regex");
    static ref TODAY: Regex = Regex::new(r"(?i)\btoday\b").expect("valid regex");
    static ref IN_YEAR: Regex =
        Regex::new(r"(?i)\b(?:in|during|for)\s+((?:19|20)\d{2})\b").expect("valid regex");
    static ref CATEGORY_AFTER: Regex = Regex::new(
        r#"(?i)\bcategory\s+(?:of\s+|is\s+|=\s*)?["']?([a-z][a-z-]*)"#
    )
    .expect("valid regex");
    static ref CATEGORY_BEFORE: Regex =
        Regex::new(r"(?i)\b([a-z][a-z-]*)\s+category\b").expect("valid regex");
    static ref QUERY_HEAD: Regex = Regex::new(
        r"(?i)^\s*(list|show|find|count|get)\s+(?:all\s+|the\s+)?([a-z][a-z_ ]*?)\s+where\s+(.+)$"
    )
    .expect("valid regex");
    static ref TRAILING_FOR: Regex = Regex::new(r"(?i)\s+for\s+").expect("valid regex");
    static ref OPERATOR_PATTERNS: Vec<(Regex, ComparisonOp)> = OPERATORS
        .iter()
        .map(|(phrase, op)| (Regex::new(&operator_pattern(phrase)).expect("valid regex"), *op))
        .collect();
    static ref SUB_TOPICS: HashMap<SubTopic, Regex> = SubTopic::ALL
        .iter()
        .map(|t| (*t, Regex::new(t.pattern()).expect("valid regex")))
        .collect();
}

/// Narrower aspect of an intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubTopic {
    Progress,
    Achieved,
    Active,
    Overdue,
    Spending,
    Remaining,
    Attendance,
    Effectiveness,
}

impl SubTopic {
    pub const ALL: [SubTopic; 8] = [
        SubTopic::Progress,
        SubTopic::Achieved,
        SubTopic::Active,
        SubTopic::Overdue,
        SubTopic::Spending,
        SubTopic::Remaining,
        SubTopic::Attendance,
        SubTopic::Effectiveness,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SubTopic::Progress => "progress",
            SubTopic::Achieved => "achieved",
            SubTopic::Active => "active",
            SubTopic::Overdue => "overdue",
            SubTopic::Spending => "spending",
            SubTopic::Remaining => "remaining",
            SubTopic::Attendance => "attendance",
            SubTopic::Effectiveness => "effectiveness",
        }
    }

    fn pattern(&self) -> &'static str {
        match self {
            SubTopic::Achieved => r"(?i)\b(achieved|completed|met|accomplished)\b",
            SubTopic::Overdue => r"(?i)\b(overdue|behind|late|past due)\b",
            SubTopic::Active => r"(?i)\b(active|current|ongoing|open|in progress)\b",
            SubTopic::Progress => r"(?i)\b(progress\w*|on track)\b",
            SubTopic::Remaining => r"(?i)\b(remaining|left|balance|available)\b",
            SubTopic::Spending => r"(?i)\b(spent|spend|spending|expenses?|costs?)\b",
            SubTopic::Attendance => r"(?i)\b(attendance|attend\w*|no[- ]shows?|cancel\w*|missed)\b",
            SubTopic::Effectiveness => r"(?i)\b(effective\w*|work(s|ed)? best|best|worked|helpful)\b",
        }
    }

    /// Sub-topics that make sense for an intent, checked in order
    fn candidates(intent: Intent) -> &'static [SubTopic] {
        match intent {
            Intent::PatientGoals | Intent::GoalProgress => &[
                SubTopic::Achieved,
                SubTopic::Overdue,
                SubTopic::Active,
                SubTopic::Progress,
            ],
            Intent::BudgetInfo => &[SubTopic::Remaining, SubTopic::Spending],
            Intent::SessionEngagement => &[SubTopic::Attendance],
            Intent::StrategyInsights => &[SubTopic::Effectiveness],
            _ => &[],
        }
    }

    /// Detect the first sub-topic relevant to `intent` mentioned in `text`
    pub fn detect(intent: Intent, text: &str) -> Option<SubTopic> {
        Self::candidates(intent)
            .iter()
            .copied()
            .find(|topic| SUB_TOPICS.get(topic).map_or(false, |re| re.is_match(text)))
    }
}

const NOT_CATEGORIES: &[&str] = &["the", "a", "an", "each", "every", "per", "by", "which", "what", "any", "that", "this"];

/// `category therapy`, `therapy category`
pub fn parse_category(text: &str) -> Option<String> {
    let found = CATEGORY_AFTER
        .captures(text)
        .or_else(|| CATEGORY_BEFORE.captures(text))
        .map(|caps| caps[1].to_lowercase())?;
    if NOT_CATEGORIES.contains(&found.as_str()) {
        None
    } else {
        Some(found)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryAction {
    List,
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
}

impl ComparisonOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Ne => "!=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Contains => "contains",
        }
    }
}

/// Phrasing of each operator, longest first so `is not` wins over `is`
const OPERATORS: &[(&str, ComparisonOp)] = &[
    ("is not", ComparisonOp::Ne),
    ("!=", ComparisonOp::Ne),
    (">=", ComparisonOp::Gte),
    ("<=", ComparisonOp::Lte),
    ("is at least", ComparisonOp::Gte),
    ("at least", ComparisonOp::Gte),
    ("is at most", ComparisonOp::Lte),
    ("at most", ComparisonOp::Lte),
    ("is greater than", ComparisonOp::Gt),
    ("greater than", ComparisonOp::Gt),
    ("more than", ComparisonOp::Gt),
    ("is less than", ComparisonOp::Lt),
    ("less than", ComparisonOp::Lt),
    ("is after", ComparisonOp::Gt),
    ("after", ComparisonOp::Gt),
    ("is before", ComparisonOp::Lt),
    ("before", ComparisonOp::Lt),
    ("contains", ComparisonOp::Contains),
    ("equals", ComparisonOp::Eq),
    ("is", ComparisonOp::Eq),
    ("=", ComparisonOp::Eq),
    (">", ComparisonOp::Gt),
    ("<", ComparisonOp::Lt),
];

/// One `field op value` condition; validated against the record schema by
/// the query tool, not here
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub field: String,
    pub op: ComparisonOp,
    pub value: String,
}

/// Symbols match anywhere; worded operators need whitespace on both sides
fn operator_pattern(phrase: &str) -> String {
    let escaped = regex::escape(phrase);
    if phrase.chars().any(|c| c.is_alphabetic()) {
        format!(r"(?i)\s{}\s", escaped.replace(' ', r"\s+"))
    } else {
        escaped
    }
}

impl FilterSpec {
    fn parse(clause: &str) -> Option<FilterSpec> {
        for (pattern, op) in OPERATOR_PATTERNS.iter() {
            let Some(found) = pattern.find(clause) else { continue };
            let (start, end) = (found.start(), found.end());

            let field = normalize_name(&clause[..start]);
            let value = clause[end..]
                .trim()
                .trim_matches(|c| c == '"' || c == '\'')
                .to_string();
            if field.is_empty() || value.is_empty() {
                return None;
            }
            return Some(FilterSpec {
                field,
                op: *op,
                value,
            });
        }
        None
    }
}

/// Structured record query: `count sessions where engagement >= 4`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuerySpec {
    pub action: QueryAction,
    pub entity: String,
    pub filters: Vec<FilterSpec>,
}

fn normalize_name(raw: &str) -> String {
    raw.trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

impl QuerySpec {
    /// Parse `<action> <entity> where <cond> [and <cond>...] [for <patient>]`.
    ///
    /// Returns `None` when any condition has no recognisable operator.
    pub fn parse(text: &str) -> Option<QuerySpec> {
        let text = text.trim().trim_end_matches(|c| c == '?' || c == '.' || c == '!');
        let caps = QUERY_HEAD.captures(text)?;
        let action = match caps[1].to_lowercase().as_str() {
            "count" => QueryAction::Count,
            _ => QueryAction::List,
        };
        let entity = normalize_name(&caps[2]);

        let mut conditions = caps.get(3)?.as_str();
        if let Some(m) = TRAILING_FOR.find_iter(conditions).last() {
            conditions = &conditions[..m.start()];
        }

        let filters = conditions
            .split(" and ")
            .flat_map(|part| part.split(" AND "))
            .map(FilterSpec::parse)
            .collect::<Option<Vec<_>>>()?;
        if filters.is_empty() {
            return None;
        }

        Some(QuerySpec {
            action,
            entity,
            filters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinic::testing::{d, today};

    #[test]
    fn test_parse_relative_windows() {
        assert_eq!(DateSpec::parse("sessions last month"), Some(DateSpec::PreviousMonth));
        assert_eq!(DateSpec::parse("spent this year"), Some(DateSpec::ThisYear));
        assert_eq!(
            DateSpec::parse("attendance over the last 3 months"),
            Some(DateSpec::LastMonths { months: 3 })
        );
        assert_eq!(
            DateSpec::parse("past 2 weeks"),
            Some(DateSpec::LastDays { days: 14 })
        );
        assert_eq!(DateSpec::parse("what about goals"), None);
    }

    #[test]
    fn test_parse_absolute_windows() {
        assert_eq!(
            DateSpec::parse("sessions since 2024-03-01"),
            Some(DateSpec::Since { start: d(2024, 3, 1) })
        );
        assert_eq!(
            DateSpec::parse("between 2024-01-01 and 2024-03-31"),
            Some(DateSpec::Between {
                start: d(2024, 1, 1),
                end: d(2024, 3, 31)
            })
        );
        assert_eq!(DateSpec::parse("spending in 2023"), Some(DateSpec::Year { year: 2023 }));
    }

    #[test]
    fn test_resolve_against_today() {
        let today = today(); // Sunday 2024-06-30
        assert_eq!(
            DateSpec::PreviousMonth.resolve(today),
            DateRange::new(d(2024, 5, 1), d(2024, 5, 31))
        );
        assert_eq!(
            DateSpec::ThisWeek.resolve(today),
            DateRange::new(d(2024, 6, 24), d(2024, 6, 30))
        );
        assert_eq!(
            DateSpec::PreviousWeek.resolve(today),
            DateRange::new(d(2024, 6, 17), d(2024, 6, 23))
        );
        assert_eq!(
            DateSpec::LastDays { days: 7 }.resolve(today),
            DateRange::new(d(2024, 6, 24), d(2024, 6, 30))
        );
        assert_eq!(
            DateSpec::LastMonths { months: 3 }.resolve(today),
            DateRange::new(d(2024, 3, 30), d(2024, 6, 30))
        );
        assert_eq!(
            DateSpec::ThisYear.resolve(today),
            DateRange::new(d(2024, 1, 1), d(2024, 6, 30))
        );
    }

    #[test]
    fn test_sub_topic_depends_on_intent() {
        assert_eq!(
            SubTopic::detect(Intent::PatientGoals, "which goals were achieved"),
            Some(SubTopic::Achieved)
        );
        assert_eq!(
            SubTopic::detect(Intent::GoalProgress, "how is he progressing"),
            Some(SubTopic::Progress)
        );
        assert_eq!(
            SubTopic::detect(Intent::BudgetInfo, "how much funding is left"),
            Some(SubTopic::Remaining)
        );
        assert_eq!(SubTopic::detect(Intent::PatientCount, "achieved"), None);
    }

    #[test]
    fn test_parse_category() {
        assert_eq!(parse_category("spending in the therapy category"), Some("therapy".to_string()));
        assert_eq!(parse_category("budget with category equipment"), Some("equipment".to_string()));
        assert_eq!(parse_category("goals by category"), None);
        assert_eq!(parse_category("how much was spent"), None);
    }

    #[test]
    fn test_parse_query_with_operators() {
        let spec =
            QuerySpec::parse("Count sessions where engagement is at least 4 for Liam O'Brien")
                .unwrap();
        assert_eq!(spec.action, QueryAction::Count);
        assert_eq!(spec.entity, "sessions");
        assert_eq!(
            spec.filters,
            vec![FilterSpec {
                field: "engagement".to_string(),
                op: ComparisonOp::Gte,
                value: "4".to_string()
            }]
        );
    }

    #[test]
    fn test_parse_query_multiple_conditions() {
        let spec =
            QuerySpec::parse("list goals where status is not achieved and progress > 40 for #456789?")
                .unwrap();
        assert_eq!(spec.action, QueryAction::List);
        assert_eq!(spec.filters.len(), 2);
        assert_eq!(spec.filters[0].op, ComparisonOp::Ne);
        assert_eq!(spec.filters[0].value, "achieved");
        assert_eq!(spec.filters[1].field, "progress");
        assert_eq!(spec.filters[1].op, ComparisonOp::Gt);
    }

    #[test]
    fn test_parse_query_with_non_ascii_text() {
        // Lowercasing these changes their byte length
        let spec = QuerySpec::parse("List goals where İ is €€").unwrap();
        assert_eq!(spec.filters[0].op, ComparisonOp::Eq);
        assert_eq!(spec.filters[0].value, "€€");

        let spec = QuerySpec::parse("list goals where \u{212A}İİ title CONTAINS café").unwrap();
        assert_eq!(spec.filters[0].op, ComparisonOp::Contains);
        assert_eq!(spec.filters[0].value, "café");
    }

    #[test]
    fn test_worded_operators_ignore_case() {
        let spec = QuerySpec::parse("LIST GOALS WHERE STATUS IS NOT achieved").unwrap();
        assert_eq!(spec.filters[0].field, "status");
        assert_eq!(spec.filters[0].op, ComparisonOp::Ne);
        assert_eq!(spec.filters[0].value, "achieved");
    }

    #[test]
    fn test_parse_query_rejects_missing_operator() {
        assert!(QuerySpec::parse("list goals where status for #456789").is_none());
        assert!(QuerySpec::parse("list goals for #456789").is_none());
    }
}

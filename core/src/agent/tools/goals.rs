use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::resolve::require_patient;
use super::{average, Tool, ToolContext, ToolData, ToolError, ToolInput, ToolOutput};
use crate::agent::intent::SubTopic;
use crate::clinic::{Goal, GoalStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalLine {
    pub title: String,
    pub category: String,
    pub status: GoalStatus,
    pub progress: u8,
    pub target_date: Option<NaiveDate>,
}

impl From<&Goal> for GoalLine {
    fn from(goal: &Goal) -> Self {
        Self {
            title: goal.title.clone(),
            category: goal.category.clone(),
            status: goal.status,
            progress: goal.progress,
            target_date: goal.target_date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoalReport {
    pub focus: Option<SubTopic>,
    /// Human description of the date window, if one was asked for
    pub period: Option<String>,
    pub category: Option<String>,
    pub total: usize,
    pub achieved: usize,
    pub in_progress: usize,
    pub not_started: usize,
    pub overdue: usize,
    pub average_progress: Option<f64>,
    /// Goals matching the focus, at most `top_n`
    pub goals: Vec<GoalLine>,
    /// Goals matching the focus before truncation
    pub matching: usize,
}

fn is_overdue(goal: &Goal, today: NaiveDate) -> bool {
    matches!(goal.status, GoalStatus::NotStarted | GoalStatus::InProgress)
        && goal.target_date.map_or(false, |target| target < today)
}

impl GoalReport {
    fn build(goals: &[Goal], focus: Option<SubTopic>, today: NaiveDate, top_n: usize) -> Self {
        let count = |status: GoalStatus| goals.iter().filter(|g| g.status == status).count();

        let mut selected: Vec<&Goal> = goals
            .iter()
            .filter(|g| match focus {
                Some(SubTopic::Achieved) => g.status == GoalStatus::Achieved,
                Some(SubTopic::Active) => {
                    matches!(g.status, GoalStatus::NotStarted | GoalStatus::InProgress)
                }
                Some(SubTopic::Overdue) => is_overdue(g, today),
                _ => g.status != GoalStatus::Discontinued,
            })
            .collect();
        match focus {
            Some(SubTopic::Progress) => {
                selected.sort_by(|a, b| b.progress.cmp(&a.progress).then(a.id.cmp(&b.id)))
            }
            _ => selected.sort_by(|a, b| {
                a.target_date
                    .unwrap_or(NaiveDate::MAX)
                    .cmp(&b.target_date.unwrap_or(NaiveDate::MAX))
                    .then(a.id.cmp(&b.id))
            }),
        }

        Self {
            focus,
            period: None,
            category: None,
            total: goals.len(),
            achieved: count(GoalStatus::Achieved),
            in_progress: count(GoalStatus::InProgress),
            not_started: count(GoalStatus::NotStarted),
            overdue: goals.iter().filter(|g| is_overdue(g, today)).count(),
            average_progress: average(
                goals
                    .iter()
                    .filter(|g| g.status != GoalStatus::Discontinued)
                    .map(|g| g.progress as f64),
            ),
            matching: selected.len(),
            goals: selected.into_iter().take(top_n).map(GoalLine::from).collect(),
        }
    }

    pub fn render(&self, subject: &str) -> String {
        let mut scope = String::new();
        if let Some(category) = &self.category {
            scope.push_str(&format!(" in the {} category", category));
        }
        if let Some(period) = &self.period {
            scope.push_str(&format!(" ({})", period));
        }

        if self.total == 0 {
            return format!("{} has no goals on record{}.", subject, scope);
        }

        let mut lines = vec![format!(
            "{} has {} goal{}{}: {} achieved, {} in progress, {} not started.",
            subject,
            self.total,
            if self.total == 1 { "" } else { "s" },
            scope,
            self.achieved,
            self.in_progress,
            self.not_started
        )];
        if let Some(avg) = self.average_progress {
            lines.push(format!("Average progress: {:.0}%.", avg));
        }
        if self.overdue > 0 {
            lines.push(format!("{} goal(s) are past their target date.", self.overdue));
        }

        let heading = match self.focus {
            Some(SubTopic::Achieved) => "Achieved goals",
            Some(SubTopic::Active) => "Active goals",
            Some(SubTopic::Overdue) => "Overdue goals",
            Some(SubTopic::Progress) => "Progress by goal",
            _ => "Goals",
        };
        if self.goals.is_empty() {
            lines.push(format!("{}: none.", heading));
        } else {
            lines.push(format!("{}:", heading));
            for goal in &self.goals {
                let target = goal
                    .target_date
                    .map(|d| format!(", target {}", d.format("%Y-%m-%d")))
                    .unwrap_or_default();
                lines.push(format!(
                    "- {} [{}] {}, {}%{}",
                    goal.title,
                    goal.category,
                    goal.status.as_str(),
                    goal.progress,
                    target
                ));
            }
            if self.matching > self.goals.len() {
                lines.push(format!("...and {} more.", self.matching - self.goals.len()));
            }
        }
        lines.join("\n")
    }
}

pub(super) async fn track(ctx: &ToolContext, input: &ToolInput) -> Result<ToolOutput, ToolError> {
    let patient = require_patient(ctx, input.patient_reference.as_ref()).await?;
    let filter = ctx.filter(&input.parameters);
    let goals = ctx
        .policy
        .call("list_goals", || ctx.data.list_goals(patient.id, &filter))
        .await?;

    let mut report = GoalReport::build(&goals, input.parameters.sub_topic, ctx.today, ctx.top_n);
    report.period = input.parameters.date_range.map(|d| d.describe());
    report.category = filter.category.clone();

    Ok(ToolOutput {
        tool: Tool::GoalTracking,
        patient: Some(patient.summary()),
        data: ToolData::Goals(report),
    })
}

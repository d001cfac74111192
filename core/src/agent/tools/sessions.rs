use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::resolve::require_patient;
use super::{average, Tool, ToolContext, ToolData, ToolError, ToolInput, ToolOutput};
use crate::agent::intent::SubTopic;
use crate::clinic::{Attendance, TherapySession};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLine {
    pub date: NaiveDate,
    pub attendance: Attendance,
    pub duration_minutes: u32,
    pub engagement: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngagementReport {
    pub focus: Option<SubTopic>,
    pub period: Option<String>,
    pub total: usize,
    pub attended: usize,
    pub cancelled: usize,
    pub no_shows: usize,
    /// Attended sessions as a percentage of all scheduled sessions
    pub attendance_rate: Option<f64>,
    pub average_engagement: Option<f64>,
    pub minutes_attended: u32,
    /// Newest first, at most `top_n`
    pub recent: Vec<SessionLine>,
}

impl EngagementReport {
    fn build(sessions: &[TherapySession], top_n: usize) -> Self {
        let count = |a: Attendance| sessions.iter().filter(|s| s.attendance == a).count();
        let attended = count(Attendance::Attended);

        let mut recent: Vec<&TherapySession> = sessions.iter().collect();
        recent.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));

        Self {
            focus: None,
            period: None,
            total: sessions.len(),
            attended,
            cancelled: count(Attendance::Cancelled),
            no_shows: count(Attendance::NoShow),
            attendance_rate: (!sessions.is_empty())
                .then(|| attended as f64 / sessions.len() as f64 * 100.0),
            average_engagement: average(
                sessions
                    .iter()
                    .filter(|s| s.attendance == Attendance::Attended)
                    .filter_map(|s| s.engagement)
                    .map(f64::from),
            ),
            minutes_attended: sessions
                .iter()
                .filter(|s| s.attendance == Attendance::Attended)
                .map(|s| s.duration_minutes)
                .sum(),
            recent: recent
                .into_iter()
                .take(top_n)
                .map(|s| SessionLine {
                    date: s.date,
                    attendance: s.attendance,
                    duration_minutes: s.duration_minutes,
                    engagement: s.engagement,
                })
                .collect(),
        }
    }

    pub fn render(&self, subject: &str) -> String {
        let period = self
            .period
            .as_ref()
            .map(|p| format!(" {}", p))
            .unwrap_or_default();
        if self.total == 0 {
            return format!("No sessions are recorded for {}{}.", subject, period);
        }

        let attendance = format!(
            "{} attended {} of {} scheduled session(s){} ({:.0}%): {} cancelled, {} no-show.",
            subject,
            self.attended,
            self.total,
            period,
            self.attendance_rate.unwrap_or(0.0),
            self.cancelled,
            self.no_shows
        );
        let engagement = match self.average_engagement {
            Some(avg) => format!(
                "Average engagement {:.1}/5 over {} minute(s) attended.",
                avg, self.minutes_attended
            ),
            None => "No engagement ratings were recorded.".to_string(),
        };

        let mut lines = match self.focus {
            Some(SubTopic::Attendance) => vec![attendance],
            _ => vec![attendance, engagement],
        };
        lines.push("Recent sessions:".to_string());
        for s in &self.recent {
            let rating = s
                .engagement
                .map(|e| format!(", engagement {}/5", e))
                .unwrap_or_default();
            lines.push(format!(
                "- {} {} ({} min){}",
                s.date.format("%Y-%m-%d"),
                s.attendance.as_str(),
                s.duration_minutes,
                rating
            ));
        }
        lines.join("\n")
    }
}

pub(super) async fn engagement(ctx: &ToolContext, input: &ToolInput) -> Result<ToolOutput, ToolError> {
    let patient = require_patient(ctx, input.patient_reference.as_ref()).await?;
    let filter = ctx.filter(&input.parameters);
    let sessions = ctx
        .policy
        .call("list_sessions", || ctx.data.list_sessions(patient.id, &filter))
        .await?;

    let mut report = EngagementReport::build(&sessions, ctx.top_n);
    report.focus = input.parameters.sub_topic;
    report.period = input.parameters.date_range.map(|d| d.describe());

    Ok(ToolOutput {
        tool: Tool::SessionEngagement,
        patient: Some(patient.summary()),
        data: ToolData::Engagement(report),
    })
}

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::resolve::require_patient;
use super::{Tool, ToolContext, ToolData, ToolError, ToolInput, ToolOutput};
use crate::clinic::{Attendance, GoalStatus, Patient, RecordFilter};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CensusReport {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
}

impl CensusReport {
    pub fn render(&self) -> String {
        match self.total {
            0 => "There are no patients on record.".to_string(),
            1 => format!(
                "There is 1 patient on record ({}).",
                if self.active == 1 { "active" } else { "inactive" }
            ),
            total => format!(
                "There are {} patients on record: {} active and {} inactive.",
                total, self.active, self.inactive
            ),
        }
    }
}

pub(super) async fn census(ctx: &ToolContext) -> Result<ToolOutput, ToolError> {
    let patients = ctx
        .policy
        .call("list_patients", || ctx.data.list_patients())
        .await?;
    let active = patients.iter().filter(|p| p.active).count();
    Ok(ToolOutput {
        tool: Tool::PatientCensus,
        patient: None,
        data: ToolData::Census(CensusReport {
            total: patients.len(),
            active,
            inactive: patients.len() - active,
        }),
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileReport {
    pub patient: Patient,
    pub goal_count: usize,
    pub goals_in_progress: usize,
    pub goals_achieved: usize,
    pub sessions_attended: usize,
    pub last_session: Option<NaiveDate>,
    pub total_funding: Option<f64>,
}

impl ProfileReport {
    pub fn render(&self) -> String {
        let p = &self.patient;
        let mut lines = vec![format!(
            "{} is {} patient.",
            p.label(),
            if p.active { "an active" } else { "an inactive" }
        )];
        if let Some(dob) = p.date_of_birth {
            lines.push(format!("Date of birth: {}", dob.format("%Y-%m-%d")));
        }
        if let Some(clinician) = &p.clinician {
            lines.push(format!("Clinician: {}", clinician));
        }
        if let Some(enrolled) = p.enrolled_on {
            lines.push(format!("Enrolled: {}", enrolled.format("%Y-%m-%d")));
        }
        lines.push(format!(
            "Goals: {} ({} in progress, {} achieved)",
            self.goal_count, self.goals_in_progress, self.goals_achieved
        ));
        lines.push(match self.last_session {
            Some(date) => format!(
                "Sessions attended: {} (last on {})",
                self.sessions_attended,
                date.format("%Y-%m-%d")
            ),
            None => "No sessions recorded.".to_string(),
        });
        if let Some(funding) = self.total_funding {
            lines.push(format!("Plan funding: {:.2}", funding));
        }
        lines.join("\n")
    }
}

pub(super) async fn profile(ctx: &ToolContext, input: &ToolInput) -> Result<ToolOutput, ToolError> {
    let patient = require_patient(ctx, input.patient_reference.as_ref()).await?;
    let all = RecordFilter::default();

    let goals = ctx
        .policy
        .call("list_goals", || ctx.data.list_goals(patient.id, &all))
        .await?;
    let sessions = ctx
        .policy
        .call("list_sessions", || ctx.data.list_sessions(patient.id, &all))
        .await?;
    let settings = ctx
        .policy
        .call("budget_settings", || ctx.data.budget_settings(patient.id))
        .await?;

    let attended: Vec<NaiveDate> = sessions
        .iter()
        .filter(|s| s.attendance == Attendance::Attended)
        .map(|s| s.date)
        .collect();

    let report = ProfileReport {
        goal_count: goals.len(),
        goals_in_progress: goals
            .iter()
            .filter(|g| g.status == GoalStatus::InProgress)
            .count(),
        goals_achieved: goals
            .iter()
            .filter(|g| g.status == GoalStatus::Achieved)
            .count(),
        sessions_attended: attended.len(),
        last_session: attended.iter().max().copied(),
        total_funding: settings.map(|s| s.total_funding),
        patient: patient.clone(),
    };

    Ok(ToolOutput {
        tool: Tool::PatientProfile,
        patient: Some(patient.summary()),
        data: ToolData::Profile(report),
    })
}

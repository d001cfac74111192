use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::resolve::require_patient;
use super::{average, Tool, ToolContext, ToolData, ToolError, ToolInput, ToolOutput};
use crate::clinic::StrategyUsage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyLine {
    pub strategy: String,
    pub uses: usize,
    pub average_effectiveness: Option<f64>,
    pub last_used: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyReport {
    pub period: Option<String>,
    pub total_uses: usize,
    pub distinct: usize,
    /// Most effective first, at most `top_n`
    pub strategies: Vec<StrategyLine>,
}

fn rank(usages: &[StrategyUsage], top_n: usize) -> Vec<StrategyLine> {
    let mut grouped: BTreeMap<String, Vec<&StrategyUsage>> = BTreeMap::new();
    for usage in usages {
        grouped
            .entry(usage.strategy.trim().to_lowercase())
            .or_default()
            .push(usage);
    }

    let mut lines: Vec<StrategyLine> = grouped
        .into_iter()
        .filter_map(|(strategy, uses)| {
            Some(StrategyLine {
                uses: uses.len(),
                average_effectiveness: average(
                    uses.iter().filter_map(|u| u.effectiveness).map(f64::from),
                ),
                last_used: uses.iter().map(|u| u.date).max()?,
                strategy,
            })
        })
        .collect();

    lines.sort_by(|a, b| {
        let a_eff = a.average_effectiveness.unwrap_or(-1.0);
        let b_eff = b.average_effectiveness.unwrap_or(-1.0);
        b_eff
            .partial_cmp(&a_eff)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(b.uses.cmp(&a.uses))
            .then_with(|| a.strategy.cmp(&b.strategy))
    });
    lines.truncate(top_n);
    lines
}

impl StrategyReport {
    pub fn render(&self, subject: &str) -> String {
        let period = self
            .period
            .as_ref()
            .map(|p| format!(" {}", p))
            .unwrap_or_default();
        if self.total_uses == 0 {
            return format!("No strategies were recorded for {}{}.", subject, period);
        }

        let mut lines = vec![format!(
            "{} strateg{} used {} time(s) with {}{}, most effective first:",
            self.distinct,
            if self.distinct == 1 { "y" } else { "ies" },
            self.total_uses,
            subject,
            period
        )];
        for line in &self.strategies {
            let rating = line
                .average_effectiveness
                .map(|e| format!("average effectiveness {:.1}/5", e))
                .unwrap_or_else(|| "not rated".to_string());
            lines.push(format!(
                "- {}: {} use(s), {}, last used {}",
                line.strategy,
                line.uses,
                rating,
                line.last_used.format("%Y-%m-%d")
            ));
        }
        lines.join("\n")
    }
}

pub(super) async fn insights(ctx: &ToolContext, input: &ToolInput) -> Result<ToolOutput, ToolError> {
    let patient = require_patient(ctx, input.patient_reference.as_ref()).await?;
    let filter = ctx.filter(&input.parameters);
    let usages = ctx
        .policy
        .call("list_strategy_usage", || ctx.data.list_strategy_usage(patient.id, &filter))
        .await?;

    let strategies = rank(&usages, ctx.top_n);
    let distinct = usages
        .iter()
        .map(|u| u.strategy.trim().to_lowercase())
        .collect::<std::collections::BTreeSet<_>>()
        .len();

    Ok(ToolOutput {
        tool: Tool::StrategyInsights,
        patient: Some(patient.summary()),
        data: ToolData::Strategies(StrategyReport {
            period: input.parameters.date_range.map(|d| d.describe()),
            total_uses: usages.len(),
            distinct,
            strategies,
        }),
    })
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::resolve::require_patient;
use super::{Tool, ToolContext, ToolData, ToolError, ToolInput, ToolOutput};
use crate::agent::intent::SubTopic;
use crate::clinic::{BudgetItem, DateRange, RecordFilter};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySpend {
    pub category: String,
    pub amount: f64,
    pub items: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BudgetReport {
    pub focus: Option<SubTopic>,
    pub period: Option<String>,
    pub category: Option<String>,
    pub total_funding: Option<f64>,
    pub plan: Option<DateRange>,
    /// Spent within the requested period and category
    pub spent: f64,
    pub item_count: usize,
    /// Funding minus everything spent under the plan
    pub remaining: Option<f64>,
    pub percent_used: Option<f64>,
    /// Largest categories first, at most `top_n`
    pub by_category: Vec<CategorySpend>,
}

fn group_by_category(items: &[BudgetItem], top_n: usize) -> Vec<CategorySpend> {
    let mut groups: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
    for item in items {
        let entry = groups.entry(item.category.as_str()).or_insert((0.0, 0));
        entry.0 += item.amount;
        entry.1 += 1;
    }
    let mut spends: Vec<CategorySpend> = groups
        .into_iter()
        .map(|(category, (amount, items))| CategorySpend {
            category: category.to_string(),
            amount,
            items,
        })
        .collect();
    spends.sort_by(|a, b| {
        b.amount
            .partial_cmp(&a.amount)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.category.cmp(&b.category))
    });
    spends.truncate(top_n);
    spends
}

impl BudgetReport {
    pub fn render(&self, subject: &str) -> String {
        let mut scope = String::new();
        if let Some(category) = &self.category {
            scope.push_str(&format!(" on {}", category));
        }
        if let Some(period) = &self.period {
            scope.push_str(&format!(" {}", period));
        }

        let spent_line = format!(
            "{} has spent {:.2}{} across {} item{}.",
            subject,
            self.spent,
            scope,
            self.item_count,
            if self.item_count == 1 { "" } else { "s" }
        );
        let balance_line = match (self.total_funding, self.remaining) {
            (Some(funding), Some(remaining)) => Some(format!(
                "Remaining: {:.2} of {:.2} plan funding ({:.0}% used).",
                remaining,
                funding,
                self.percent_used.unwrap_or(0.0)
            )),
            _ => None,
        };

        let mut lines = Vec::new();
        match (self.focus, balance_line) {
            (Some(SubTopic::Remaining), Some(balance)) => {
                lines.push(balance);
                lines.push(spent_line);
            }
            (_, Some(balance)) => {
                lines.push(spent_line);
                lines.push(balance);
            }
            (_, None) => {
                lines.push(spent_line);
                lines.push("No funding plan is recorded.".to_string());
            }
        }
        if let Some(plan) = &self.plan {
            lines.push(format!("Plan period: {}.", plan.describe()));
        }
        if !self.by_category.is_empty() && self.category.is_none() {
            lines.push("By category:".to_string());
            for spend in &self.by_category {
                lines.push(format!("- {}: {:.2} ({} item(s))", spend.category, spend.amount, spend.items));
            }
        }
        lines.join("\n")
    }
}

pub(super) async fn track(ctx: &ToolContext, input: &ToolInput) -> Result<ToolOutput, ToolError> {
    let patient = require_patient(ctx, input.patient_reference.as_ref()).await?;
    let filter = ctx.filter(&input.parameters);

    let items = ctx
        .policy
        .call("list_budget_items", || ctx.data.list_budget_items(patient.id, &filter))
        .await?;
    let settings = ctx
        .policy
        .call("budget_settings", || ctx.data.budget_settings(patient.id))
        .await?;

    // Remaining balance counts every item dated inside the plan, whatever
    // the request's own filter. No plan means every item counts.
    let plan = settings.as_ref().map(|s| DateRange::new(s.plan_start, s.plan_end));
    let plan_filter = RecordFilter {
        range: plan,
        category: None,
    };
    let plan_spent: f64 = if filter == plan_filter {
        items.iter().map(|i| i.amount).sum()
    } else {
        ctx.policy
            .call("list_budget_items", || ctx.data.list_budget_items(patient.id, &plan_filter))
            .await?
            .iter()
            .map(|i| i.amount)
            .sum()
    };

    let total_funding = settings.as_ref().map(|s| s.total_funding);
    let report = BudgetReport {
        focus: input.parameters.sub_topic,
        period: input.parameters.date_range.map(|d| d.describe()),
        category: filter.category.clone(),
        total_funding,
        plan,
        spent: items.iter().map(|i| i.amount).sum(),
        item_count: items.len(),
        remaining: total_funding.map(|f| f - plan_spent),
        percent_used: total_funding
            .filter(|f| *f > 0.0)
            .map(|f| plan_spent / f * 100.0),
        by_category: group_by_category(&items, ctx.top_n),
    };

    Ok(ToolOutput {
        tool: Tool::BudgetTracking,
        patient: Some(patient.summary()),
        data: ToolData::Budget(report),
    })
}

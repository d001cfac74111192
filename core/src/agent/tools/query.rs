//! Flexible record query
//!
//! Validates a [`QuerySpec`] against an explicit allow-list of entities,
//! fields, field types and the operators each type supports, then runs it
//! against the clinic store. Anything outside the allow-list is a
//! validation error, never a guess.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::resolve::require_patient;
use super::{Tool, ToolContext, ToolData, ToolError, ToolInput, ToolOutput};
use crate::agent::intent::{ComparisonOp, FilterSpec, QueryAction, QuerySpec};
use crate::clinic::{PatientSummary, RecordFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Text,
    Number,
    Date,
    Bool,
    /// Closed set of lowercase values
    Enum(&'static [&'static str]),
}

impl FieldType {
    fn allows(&self, op: ComparisonOp) -> bool {
        use ComparisonOp::*;
        match self {
            FieldType::Text => matches!(op, Eq | Ne | Contains),
            FieldType::Number | FieldType::Date => !matches!(op, Contains),
            FieldType::Bool | FieldType::Enum(_) => matches!(op, Eq | Ne),
        }
    }

    fn label(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Date => "date",
            FieldType::Bool => "true/false",
            FieldType::Enum(_) => "enumerated",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: FieldType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Patients,
    Goals,
    Sessions,
    BudgetItems,
    Strategies,
}

#[derive(Debug, Clone, Copy)]
pub struct EntityDef {
    pub entity: Entity,
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub fields: &'static [FieldDef],
    /// Rows belong to one patient, so the query needs a patient reference
    pub patient_scoped: bool,
}

const GOAL_STATUSES: &[&str] = &["not_started", "in_progress", "achieved", "discontinued"];
const ATTENDANCE: &[&str] = &["attended", "cancelled", "no_show"];

pub const SCHEMA: &[EntityDef] = &[
    EntityDef {
        entity: Entity::Patients,
        name: "patients",
        aliases: &["patient", "clients", "client"],
        fields: &[
            FieldDef { name: "name", ty: FieldType::Text },
            FieldDef { name: "identifier", ty: FieldType::Text },
            FieldDef { name: "active", ty: FieldType::Bool },
            FieldDef { name: "clinician", ty: FieldType::Text },
            FieldDef { name: "enrolled_on", ty: FieldType::Date },
        ],
        patient_scoped: false,
    },
    EntityDef {
        entity: Entity::Goals,
        name: "goals",
        aliases: &["goal", "objectives"],
        fields: &[
            FieldDef { name: "title", ty: FieldType::Text },
            FieldDef { name: "category", ty: FieldType::Text },
            FieldDef { name: "status", ty: FieldType::Enum(GOAL_STATUSES) },
            FieldDef { name: "progress", ty: FieldType::Number },
            FieldDef { name: "target_date", ty: FieldType::Date },
        ],
        patient_scoped: true,
    },
    EntityDef {
        entity: Entity::Sessions,
        name: "sessions",
        aliases: &["session", "appointments"],
        fields: &[
            FieldDef { name: "date", ty: FieldType::Date },
            FieldDef { name: "duration_minutes", ty: FieldType::Number },
            FieldDef { name: "attendance", ty: FieldType::Enum(ATTENDANCE) },
            FieldDef { name: "engagement", ty: FieldType::Number },
        ],
        patient_scoped: true,
    },
    EntityDef {
        entity: Entity::BudgetItems,
        name: "budget_items",
        aliases: &["budget_item", "budget", "expenses", "expense", "items"],
        fields: &[
            FieldDef { name: "category", ty: FieldType::Text },
            FieldDef { name: "description", ty: FieldType::Text },
            FieldDef { name: "amount", ty: FieldType::Number },
            FieldDef { name: "date", ty: FieldType::Date },
        ],
        patient_scoped: true,
    },
    EntityDef {
        entity: Entity::Strategies,
        name: "strategies",
        aliases: &["strategy", "strategy_usage", "interventions"],
        fields: &[
            FieldDef { name: "strategy", ty: FieldType::Text },
            FieldDef { name: "effectiveness", ty: FieldType::Number },
            FieldDef { name: "date", ty: FieldType::Date },
        ],
        patient_scoped: true,
    },
];

/// Typed field value
#[derive(Debug, Clone, PartialEq)]
enum Value {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    Bool(bool),
    Missing,
}

impl Value {
    fn parse(ty: FieldType, field: &str, raw: &str) -> Result<Value, ToolError> {
        let raw = raw.trim();
        let invalid = || {
            ToolError::validation(format!(
                "'{}' is not a valid {} value for {}",
                raw,
                ty.label(),
                field
            ))
        };
        match ty {
            FieldType::Text => Ok(Value::Text(raw.to_lowercase())),
            FieldType::Number => raw.parse::<f64>().map(Value::Number).map_err(|_| invalid()),
            FieldType::Date => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(Value::Date)
                .map_err(|_| invalid()),
            FieldType::Bool => match raw.to_lowercase().as_str() {
                "true" | "yes" | "active" => Ok(Value::Bool(true)),
                "false" | "no" | "inactive" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
            FieldType::Enum(allowed) => {
                let normalized = raw.to_lowercase().replace([' ', '-'], "_");
                if allowed.contains(&normalized.as_str()) {
                    Ok(Value::Text(normalized))
                } else {
                    Err(ToolError::validation(format!(
                        "'{}' is not a valid {} (expected one of: {})",
                        raw,
                        field,
                        allowed.join(", ")
                    )))
                }
            }
        }
    }

    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::Date(a), Value::Date(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn satisfies(&self, op: ComparisonOp, wanted: &Value) -> bool {
        if let (ComparisonOp::Contains, Value::Text(have), Value::Text(needle)) = (op, self, wanted) {
            return have.contains(needle.as_str());
        }
        match (op, self.compare(wanted)) {
            (ComparisonOp::Ne, None) => true,
            (_, None) => false,
            (ComparisonOp::Eq, Some(o)) => o == Ordering::Equal,
            (ComparisonOp::Ne, Some(o)) => o != Ordering::Equal,
            (ComparisonOp::Gt, Some(o)) => o == Ordering::Greater,
            (ComparisonOp::Gte, Some(o)) => o != Ordering::Less,
            (ComparisonOp::Lt, Some(o)) => o == Ordering::Less,
            (ComparisonOp::Lte, Some(o)) => o != Ordering::Greater,
            (ComparisonOp::Contains, Some(_)) => false,
        }
    }
}

#[derive(Debug, Clone)]
struct Condition {
    field: FieldDef,
    op: ComparisonOp,
    value: Value,
    raw: String,
}

impl Condition {
    fn describe(&self) -> String {
        format!("{} {} {}", self.field.name, self.op.symbol(), self.raw)
    }
}

/// A query that passed schema validation
#[derive(Debug, Clone)]
pub struct ValidatedQuery {
    entity: &'static EntityDef,
    action: QueryAction,
    conditions: Vec<Condition>,
}

impl ValidatedQuery {
    pub fn entity(&self) -> &'static EntityDef {
        self.entity
    }
}

fn find_entity(name: &str) -> Option<&'static EntityDef> {
    let name = name.trim().to_lowercase();
    SCHEMA
        .iter()
        .find(|e| e.name == name || e.aliases.contains(&name.as_str()))
}

fn validate_filter(entity: &EntityDef, filter: &FilterSpec) -> Result<Condition, ToolError> {
    let field = entity
        .fields
        .iter()
        .find(|f| f.name == filter.field)
        .copied()
        .ok_or_else(|| {
            let known: Vec<&str> = entity.fields.iter().map(|f| f.name).collect();
            ToolError::validation(format!(
                "{} has no field '{}' (fields: {})",
                entity.name,
                filter.field,
                known.join(", ")
            ))
        })?;
    if !field.ty.allows(filter.op) {
        return Err(ToolError::validation(format!(
            "operator '{}' cannot be used on {} field {}",
            filter.op.symbol(),
            field.ty.label(),
            field.name
        )));
    }
    Ok(Condition {
        field,
        op: filter.op,
        value: Value::parse(field.ty, field.name, &filter.value)?,
        raw: filter.value.clone(),
    })
}

/// Check a query against the schema allow-list
pub fn validate(spec: &QuerySpec) -> Result<ValidatedQuery, ToolError> {
    let entity = find_entity(&spec.entity).ok_or_else(|| {
        let known: Vec<&str> = SCHEMA.iter().map(|e| e.name).collect();
        ToolError::validation(format!(
            "unknown record type '{}' (known: {})",
            spec.entity,
            known.join(", ")
        ))
    })?;
    if spec.filters.is_empty() {
        return Err(ToolError::validation("a query needs at least one condition"));
    }
    let conditions = spec
        .filters
        .iter()
        .map(|f| validate_filter(entity, f))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ValidatedQuery {
        entity,
        action: spec.action,
        conditions,
    })
}

/// One record flattened into typed fields plus a display label
struct Row {
    label: String,
    fields: Vec<(&'static str, Value)>,
}

impl Row {
    fn get(&self, field: &str) -> &Value {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, v)| v)
            .unwrap_or(&Value::Missing)
    }

    fn matches(&self, conditions: &[Condition]) -> bool {
        conditions
            .iter()
            .all(|c| self.get(c.field.name).satisfies(c.op, &c.value))
    }
}

fn text(value: &str) -> Value {
    Value::Text(value.to_lowercase())
}

fn opt<T>(value: Option<T>, f: impl FnOnce(T) -> Value) -> Value {
    value.map(f).unwrap_or(Value::Missing)
}

async fn fetch_rows(
    ctx: &ToolContext,
    entity: Entity,
    patient: Option<&PatientSummary>,
) -> Result<Vec<Row>, ToolError> {
    let all = RecordFilter::default();
    let Some(patient) = patient else {
        let patients = ctx
            .policy
            .call("list_patients", || ctx.data.list_patients())
            .await?;
        return Ok(patients
            .into_iter()
            .map(|p| Row {
                label: p.label(),
                fields: vec![
                    ("name", text(&p.name)),
                    ("identifier", text(&p.identifier)),
                    ("active", Value::Bool(p.active)),
                    ("clinician", opt(p.clinician.as_deref(), text)),
                    ("enrolled_on", opt(p.enrolled_on, Value::Date)),
                ],
            })
            .collect());
    };

    let id = patient.id;
    let rows = match entity {
        Entity::Patients => Vec::new(),
        Entity::Goals => ctx
            .policy
            .call("list_goals", || ctx.data.list_goals(id, &all))
            .await?
            .into_iter()
            .map(|g| Row {
                label: format!("{} ({}, {}%)", g.title, g.status.as_str(), g.progress),
                fields: vec![
                    ("title", text(&g.title)),
                    ("category", text(&g.category)),
                    ("status", Value::Text(g.status.as_str().replace(' ', "_"))),
                    ("progress", Value::Number(g.progress as f64)),
                    ("target_date", opt(g.target_date, Value::Date)),
                ],
            })
            .collect(),
        Entity::Sessions => ctx
            .policy
            .call("list_sessions", || ctx.data.list_sessions(id, &all))
            .await?
            .into_iter()
            .map(|s| Row {
                label: format!(
                    "{} {}{}",
                    s.date.format("%Y-%m-%d"),
                    s.attendance.as_str(),
                    s.engagement
                        .map(|e| format!(", engagement {}/5", e))
                        .unwrap_or_default()
                ),
                fields: vec![
                    ("date", Value::Date(s.date)),
                    ("duration_minutes", Value::Number(s.duration_minutes as f64)),
                    ("attendance", Value::Text(s.attendance.as_str().replace(' ', "_"))),
                    ("engagement", opt(s.engagement, |e| Value::Number(e as f64))),
                ],
            })
            .collect(),
        Entity::BudgetItems => ctx
            .policy
            .call("list_budget_items", || ctx.data.list_budget_items(id, &all))
            .await?
            .into_iter()
            .map(|i| Row {
                label: format!(
                    "{} {} ({}) {:.2}",
                    i.date.format("%Y-%m-%d"),
                    i.description,
                    i.category,
                    i.amount
                ),
                fields: vec![
                    ("category", text(&i.category)),
                    ("description", text(&i.description)),
                    ("amount", Value::Number(i.amount)),
                    ("date", Value::Date(i.date)),
                ],
            })
            .collect(),
        Entity::Strategies => ctx
            .policy
            .call("list_strategy_usage", || ctx.data.list_strategy_usage(id, &all))
            .await?
            .into_iter()
            .map(|u| Row {
                label: format!("{} {}", u.date.format("%Y-%m-%d"), u.strategy),
                fields: vec![
                    ("strategy", text(&u.strategy)),
                    ("effectiveness", opt(u.effectiveness, |e| Value::Number(e as f64))),
                    ("date", Value::Date(u.date)),
                ],
            })
            .collect(),
    };
    Ok(rows)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordReport {
    pub entity: String,
    pub action: QueryAction,
    pub conditions: Vec<String>,
    pub matched: usize,
    /// Labels of the first `top_n` matches, empty for counts
    pub rows: Vec<String>,
}

impl RecordReport {
    pub fn render(&self, patient: Option<&PatientSummary>) -> String {
        let scope = patient
            .map(|p| format!(" for {}", p.label()))
            .unwrap_or_default();
        let entity = self.entity.replace('_', " ");
        let head = format!(
            "{} {}{} where {}",
            self.matched,
            entity,
            scope,
            self.conditions.join(" and ")
        );
        match self.action {
            QueryAction::Count => format!("Found {}.", head),
            QueryAction::List if self.matched == 0 => format!("Found {}.", head),
            QueryAction::List => {
                let mut lines = vec![format!("Found {}:", head)];
                lines.extend(self.rows.iter().map(|r| format!("- {}", r)));
                if self.matched > self.rows.len() {
                    lines.push(format!("...and {} more.", self.matched - self.rows.len()));
                }
                lines.join("\n")
            }
        }
    }
}

pub(super) async fn run(ctx: &ToolContext, input: &ToolInput) -> Result<ToolOutput, ToolError> {
    let spec = input.parameters.query.as_ref().ok_or_else(|| {
        ToolError::validation(
            "expected a query like 'list goals where status is achieved for <patient>'",
        )
    })?;
    let query = validate(spec)?;

    let patient = if query.entity.patient_scoped {
        Some(require_patient(ctx, input.patient_reference.as_ref()).await?.summary())
    } else {
        None
    };

    let matched: Vec<Row> = fetch_rows(ctx, query.entity.entity, patient.as_ref())
        .await?
        .into_iter()
        .filter(|row| row.matches(&query.conditions))
        .collect();

    let rows = match query.action {
        QueryAction::Count => Vec::new(),
        QueryAction::List => matched.iter().take(ctx.top_n).map(|r| r.label.clone()).collect(),
    };

    Ok(ToolOutput {
        tool: Tool::RecordQuery,
        patient,
        data: ToolData::Records(RecordReport {
            entity: query.entity.name.to_string(),
            action: query.action,
            conditions: query.conditions.iter().map(Condition::describe).collect(),
            matched: matched.len(),
            rows,
        }),
    })
}

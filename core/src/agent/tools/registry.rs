//! Intent to tool routing
//!
//! The registry is an explicit map from each tool-backed [`Intent`] to its
//! primary [`Tool`]. It is assembled through [`ToolRegistryBuilder`], which
//! refuses duplicate routes, routes for intents answered without a tool, and
//! registries that leave a tool-backed intent unrouted.

use std::collections::BTreeMap;

use thiserror::Error;

use super::Tool;
use crate::agent::intent::{Intent, IntentRoute};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("no tool is routed for intent {intent}")]
    MissingRoute { intent: Intent },

    #[error("intent {intent} is routed to both {first} and {second}")]
    DuplicateRoute {
        intent: Intent,
        first: Tool,
        second: Tool,
    },

    #[error("intent {intent} is answered without a tool and cannot be routed to {tool}")]
    FallbackIntent { intent: Intent, tool: Tool },
}

#[derive(Debug, Clone)]
pub struct ToolRegistry {
    routes: BTreeMap<Intent, Tool>,
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder::default()
    }

    /// The one route per tool-backed intent used in production
    pub fn standard() -> Self {
        Self::builder()
            .route(Intent::PatientCount, Tool::PatientCensus)
            .route(Intent::PatientProfile, Tool::PatientProfile)
            .route(Intent::PatientGoals, Tool::GoalTracking)
            .route(Intent::GoalProgress, Tool::GoalTracking)
            .route(Intent::BudgetInfo, Tool::BudgetTracking)
            .route(Intent::StrategyInsights, Tool::StrategyInsights)
            .route(Intent::SessionEngagement, Tool::SessionEngagement)
            .route(Intent::RecordQuery, Tool::RecordQuery)
            .build()
            .unwrap_or_else(|e| unreachable!("standard registry is complete: {}", e))
    }

    /// Primary tool for an intent
    pub fn primary_tool(&self, intent: Intent) -> Result<Tool, RegistryError> {
        self.routes
            .get(&intent)
            .copied()
            .ok_or(RegistryError::MissingRoute { intent })
    }

    /// Lookup by tool name for direct invocation
    pub fn by_name(&self, name: &str) -> Option<Tool> {
        Tool::from_name(name).filter(|tool| self.routes.values().any(|t| t == tool))
    }

    /// Routed tools, each once, in declaration order
    pub fn tools(&self) -> Vec<Tool> {
        let mut tools: Vec<Tool> = self.routes.values().copied().collect();
        tools.sort();
        tools.dedup();
        tools
    }

    #[cfg(test)]
    pub(crate) fn unchecked(routes: impl IntoIterator<Item = (Intent, Tool)>) -> Self {
        Self {
            routes: routes.into_iter().collect(),
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Default)]
pub struct ToolRegistryBuilder {
    routes: Vec<(Intent, Tool)>,
}

impl ToolRegistryBuilder {
    pub fn route(mut self, intent: Intent, tool: Tool) -> Self {
        self.routes.push((intent, tool));
        self
    }

    pub fn build(self) -> Result<ToolRegistry, RegistryError> {
        let mut routes = BTreeMap::new();
        for (intent, tool) in self.routes {
            if intent.route() != IntentRoute::Tool {
                return Err(RegistryError::FallbackIntent { intent, tool });
            }
            if let Some(first) = routes.insert(intent, tool) {
                return Err(RegistryError::DuplicateRoute {
                    intent,
                    first,
                    second: tool,
                });
            }
        }

        if let Some(intent) = Intent::ALL
            .into_iter()
            .find(|i| i.route() == IntentRoute::Tool && !routes.contains_key(i))
        {
            return Err(RegistryError::MissingRoute { intent });
        }

        Ok(ToolRegistry { routes })
    }
}

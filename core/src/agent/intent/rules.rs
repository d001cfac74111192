//! Intent rule table
//!
//! The table is plain data: `(pattern, intent, priority)` plus the sample
//! queries each rule must classify. [`RuleTable::classify`] is the single
//! evaluation function. Higher priority is evaluated first; rules with equal
//! priority keep their declaration order, so the earliest declared wins.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use super::Intent;

/// One declarative classification rule
#[derive(Debug, Clone, Copy)]
pub struct RuleSpec {
    pub pattern: &'static str,
    pub intent: Intent,
    pub priority: u8,
    /// Queries this rule must win; doubles as the classification test corpus
    pub samples: &'static [&'static str],
}

pub const RULES: &[RuleSpec] = &[
    RuleSpec {
        pattern: r"(?i)\b(you (said|told me|mentioned|suggested)|we (discussed|talked about|covered|went over)|remind me what|what did (i|we|you) (ask|say|discuss|mention)|(i|we|you) (asked|said|discussed|mentioned) (earlier|previously|before|last time)|(earlier|before|previously) in (this|our) (chat|conversation))\b",
        intent: Intent::ConversationRecall,
        priority: 100,
        samples: &[
            "What did we discuss earlier about goals?",
            "Remind me what you said about the budget",
            "What did I ask previously?",
            "What did we cover earlier in this conversation?",
        ],
    },
    RuleSpec {
        pattern: r"(?i)\b(list|show|find|count|get)\b.+\bwhere\b",
        intent: Intent::RecordQuery,
        priority: 90,
        samples: &[
            "List goals where status is achieved for patient #456789",
            "Count sessions where engagement is at least 4 for Liam O'Brien",
            "Show patients where active is false",
        ],
    },
    RuleSpec {
        pattern: r"(?i)\bhow many (patients|clients)\b|\b(number|count|total) of (patients|clients)\b|\bpatient (count|census)\b",
        intent: Intent::PatientCount,
        priority: 80,
        samples: &[
            "How many patients do we have?",
            "What is the total number of patients?",
            "Give me the patient count",
        ],
    },
    RuleSpec {
        pattern: r"(?i)\b(budget|funding|funds|spend|spending|spent|expenses?|costs?|invoices?)\b",
        intent: Intent::BudgetInfo,
        priority: 70,
        samples: &[
            "What's the budget for Liam O'Brien?",
            "How much has been spent for patient #456789 this year?",
            "Show remaining funds for Radwan-563004",
        ],
    },
    RuleSpec {
        pattern: r"(?i)\bgoals?\b.*\b(progress\w*|on track|achieved|completed|met)\b|\b(progress\w*|on track|achieved|completed)\b.*\bgoals?\b",
        intent: Intent::GoalProgress,
        priority: 70,
        samples: &[
            "How is Liam O'Brien progressing on his goals?",
            "Goal progress for patient ID 5",
            "Which goals has Amira Radwan achieved?",
        ],
    },
    RuleSpec {
        pattern: r"(?i)\b(goals?|objectives?|targets?)\b",
        intent: Intent::PatientGoals,
        priority: 60,
        samples: &[
            "What are the goals for patient ID 5",
            "Show goals for Amira Radwan",
            "List objectives for #563004",
        ],
    },
    RuleSpec {
        pattern: r"(?i)\b(strateg(y|ies)|interventions?|techniques?)\b",
        intent: Intent::StrategyInsights,
        priority: 60,
        samples: &[
            "Which strategies work best for Liam O'Brien?",
            "What interventions were used with patient #456789?",
            "Strategies used in sessions for Radwan-563004",
        ],
    },
    RuleSpec {
        pattern: r"(?i)\b(engagement|engaged|attendance|attended|attending|sessions?|appointments?|visits?|no[- ]shows?)\b",
        intent: Intent::SessionEngagement,
        priority: 60,
        samples: &[
            "How engaged has Liam O'Brien been in sessions?",
            "Session attendance for patient #456789 last month",
            "How many sessions did John Smith attend?",
            "How did Liam's sessions go last time?",
        ],
    },
    RuleSpec {
        pattern: r"(?i)\b(tell me about|who is|details (for|of|about)|profile|info(rmation)? (on|about|for)|look ?up|find patient|show patient)\b|^\s*(patient\s+)?(#\d+|\d{6}|[A-Za-z][A-Za-z'-]*-\d+)\s*[?.!]?\s*$",
        intent: Intent::PatientProfile,
        priority: 40,
        samples: &[
            "Find patient John Smith",
            "Tell me about Amira Radwan",
            "Who is patient #123456?",
            "patient #123456",
            "Radwan-563004",
        ],
    },
    RuleSpec {
        pattern: r"(?i)^\s*(hi|hello|hey|thanks|thank you|good (morning|afternoon|evening))\b|^\s*(what|how|why|when|can|could|should|is|are|does|do|explain|describe)\b",
        intent: Intent::GeneralQuestion,
        priority: 20,
        samples: &[
            "Hello there",
            "What is a sensory diet?",
            "Explain the difference between OT and speech therapy",
        ],
    },
];

/// Compiled rule with its position in the declaration list
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub regex: Regex,
    pub intent: Intent,
    pub priority: u8,
    pub declared_at: usize,
}

/// Rules in evaluation order
#[derive(Debug, Clone)]
pub struct RuleTable {
    rules: Vec<CompiledRule>,
}

lazy_static! {
    static ref STANDARD: Arc<RuleTable> =
        Arc::new(RuleTable::compile(RULES).expect("built-in intent rules must compile"));
}

impl RuleTable {
    /// Compile and order a rule list
    pub fn compile(specs: &[RuleSpec]) -> Result<Self, regex::Error> {
        let mut rules = specs
            .iter()
            .enumerate()
            .map(|(declared_at, spec)| {
                Ok(CompiledRule {
                    regex: Regex::new(spec.pattern)?,
                    intent: spec.intent,
                    priority: spec.priority,
                    declared_at,
                })
            })
            .collect::<Result<Vec<_>, regex::Error>>()?;

        // sort_by is stable: equal priorities stay in declaration order
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Ok(Self { rules })
    }

    /// The built-in clinical rule table
    pub fn standard() -> Arc<RuleTable> {
        Arc::clone(&STANDARD)
    }

    /// First matching rule in evaluation order
    pub fn matching_rule(&self, query: &str) -> Option<&CompiledRule> {
        self.rules.iter().find(|rule| rule.regex.is_match(query))
    }

    pub fn classify(&self, query: &str) -> Option<Intent> {
        self.matching_rule(query).map(|rule| rule.intent)
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

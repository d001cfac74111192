use std::sync::Arc;

use tracing::debug;

use super::params::{parse_category, DateSpec, QuerySpec, SubTopic};
use super::reference::{find_reference, mentions_pronoun};
use super::{ExtractedEntities, Intent, Parameters, PatientReference, RuleTable};
use crate::memory::Message;

/// How many earlier user messages a pronoun may reach back through
const CARRY_OVER_DEPTH: usize = 6;

/// Rule-driven intent and entity extractor
#[derive(Debug, Clone)]
pub struct IntentExtractor {
    rules: Arc<RuleTable>,
}

impl Default for IntentExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl IntentExtractor {
    pub fn new() -> Self {
        Self {
            rules: RuleTable::standard(),
        }
    }

    pub fn with_rules(rules: Arc<RuleTable>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &RuleTable {
        &self.rules
    }

    /// Classify `query` and pull out its patient reference and parameters.
    ///
    /// `recent` is the verbatim window, oldest first; it is only consulted
    /// when the query refers back to a patient with a pronoun.
    pub fn extract(&self, query: &str, recent: &[Message]) -> ExtractedEntities {
        let query = query.trim();
        let Some(intent) = self.rules.classify(query) else {
            debug!("No rule matched {:?}", query);
            return ExtractedEntities::unknown();
        };

        let mut reference = match intent {
            Intent::PatientCount | Intent::GeneralQuestion | Intent::ConversationRecall => None,
            _ => find_reference(query),
        };
        let mut reference_from_context = false;
        if reference.is_none()
            && (intent.needs_patient() || intent == Intent::RecordQuery)
            && mentions_pronoun(query)
        {
            reference = carried_reference(recent);
            reference_from_context = reference.is_some();
        }

        let parameters = extract_parameters(intent, query);
        debug!(
            "Extracted intent={} reference={:?} carried={} params={:?}",
            intent, reference, reference_from_context, parameters
        );

        ExtractedEntities {
            intent,
            patient_reference: reference,
            reference_from_context,
            parameters,
        }
    }
}

/// Newest patient reference among the recent user messages
fn carried_reference(recent: &[Message]) -> Option<PatientReference> {
    recent
        .iter()
        .rev()
        .filter(|m| m.is_user())
        .take(CARRY_OVER_DEPTH)
        .find_map(|m| find_reference(&m.content))
}

fn extract_parameters(intent: Intent, query: &str) -> Parameters {
    match intent {
        Intent::RecordQuery => Parameters {
            query: QuerySpec::parse(query),
            ..Parameters::default()
        },
        Intent::PatientGoals
        | Intent::GoalProgress
        | Intent::BudgetInfo
        | Intent::StrategyInsights
        | Intent::SessionEngagement => Parameters {
            date_range: DateSpec::parse(query),
            sub_topic: SubTopic::detect(intent, query),
            category: parse_category(query),
            query: None,
        },
        _ => Parameters::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::intent::{ComparisonOp, QueryAction};
    use crate::memory::{Conversation, MessageRole};

    fn extract(query: &str) -> ExtractedEntities {
        IntentExtractor::new().extract(query, &[])
    }

    #[test]
    fn test_patient_count() {
        let e = extract("How many patients do we have?");
        assert_eq!(e.intent, Intent::PatientCount);
        assert_eq!(e.patient_reference, None);
    }

    #[test]
    fn test_goals_for_identifier() {
        let e = extract("What are the goals for patient ID 5");
        assert_eq!(e.intent, Intent::PatientGoals);
        assert_eq!(e.patient_reference, Some(PatientReference::identifier("5")));
    }

    #[test]
    fn test_reference_shapes() {
        assert_eq!(
            extract("patient #123456").patient_reference,
            Some(PatientReference::identifier("123456"))
        );
        assert_eq!(
            extract("Find patient John Smith").patient_reference,
            Some(PatientReference::name("John Smith"))
        );
        let e = extract("Radwan-563004");
        assert_eq!(e.intent, Intent::PatientProfile);
        assert_eq!(
            e.patient_reference,
            Some(PatientReference::combined("Radwan", "563004"))
        );
    }

    #[test]
    fn test_unknown_has_no_entities() {
        let e = extract("zxcv 123456 qwerty");
        assert_eq!(e, ExtractedEntities::unknown());
        assert_eq!(extract("   "), ExtractedEntities::unknown());
    }

    #[test]
    fn test_parameters_for_budget() {
        let e = extract("How much has been spent for patient #456789 this year?");
        assert_eq!(e.intent, Intent::BudgetInfo);
        assert_eq!(e.patient_reference, Some(PatientReference::identifier("456789")));
        assert_eq!(e.parameters.date_range, Some(DateSpec::ThisYear));
        assert_eq!(e.parameters.sub_topic, Some(SubTopic::Spending));
    }

    #[test]
    fn test_record_query_parameters() {
        let e = extract("Count sessions where engagement is at least 4 for Liam O'Brien");
        assert_eq!(e.intent, Intent::RecordQuery);
        assert_eq!(e.patient_reference, Some(PatientReference::name("Liam O'Brien")));
        let query = e.parameters.query.unwrap();
        assert_eq!(query.action, QueryAction::Count);
        assert_eq!(query.filters[0].op, ComparisonOp::Gte);
    }

    #[test]
    fn test_non_ascii_query_text_is_extracted() {
        let e = extract("List goals where İ is €€");
        let query = e.parameters.query.unwrap();
        assert_eq!(query.filters[0].value, "€€");
    }

    #[test]
    fn test_last_time_about_a_patient_is_a_data_question() {
        let e = extract("How did Liam's sessions go last time?");
        assert_eq!(e.intent, Intent::SessionEngagement);
        assert_eq!(e.patient_reference, Some(PatientReference::name("Liam")));
    }

    #[test]
    fn test_pronoun_carries_newest_reference() {
        let mut conv = Conversation::new("t");
        conv.push(MessageRole::User, "Show goals for Amira Radwan", Vec::new());
        conv.push(MessageRole::Assistant, "Amira Radwan (#563004) has 2 goals.", Vec::new());
        conv.push(MessageRole::User, "Budget for patient #456789", Vec::new());
        conv.push(MessageRole::Assistant, "Liam O'Brien has spent 4770.50.", Vec::new());

        let e = IntentExtractor::new().extract("How did their sessions go last month?", conv.messages());
        assert_eq!(e.intent, Intent::SessionEngagement);
        assert_eq!(e.patient_reference, Some(PatientReference::identifier("456789")));
        assert!(e.reference_from_context);
        assert_eq!(e.parameters.date_range, Some(DateSpec::PreviousMonth));
    }

    #[test]
    fn test_no_carry_over_without_pronoun() {
        let mut conv = Conversation::new("t");
        conv.push(MessageRole::User, "Budget for patient #456789", Vec::new());
        let e = IntentExtractor::new().extract("Show goals", conv.messages());
        assert_eq!(e.intent, Intent::PatientGoals);
        assert_eq!(e.patient_reference, None);
        assert!(!e.reference_from_context);
    }

    #[test]
    fn test_explicit_reference_beats_context() {
        let mut conv = Conversation::new("t");
        conv.push(MessageRole::User, "Budget for patient #456789", Vec::new());
        let e = IntentExtractor::new().extract("What about his goals, Radwan-563004?", conv.messages());
        assert_eq!(
            e.patient_reference,
            Some(PatientReference::combined("Radwan", "563004"))
        );
        assert!(!e.reference_from_context);
    }

    #[test]
    fn test_count_ignores_stray_reference() {
        let e = extract("How many patients named Smith do we have?");
        assert_eq!(e.intent, Intent::PatientCount);
        assert_eq!(e.patient_reference, None);
    }
}

//! Dispatch engine
//!
//! The core abstraction: (state, observation) -> Transition.
//!
//! No async. No IO. The engine routes the extracted intent to a tool, reads
//! each observation and decides whether to retry, fall back, clarify or
//! finish. It never runs anything itself.

use super::decision::{AgentDecision, FinishReason, Transition};
use super::error::AgentError;
use super::input::ToolInvocation;
use super::state::{AgentState, Phase};
use crate::agent::intent::{IntentRoute, PatientReference};
use crate::agent::tools::{Tool, ToolError, ToolInput, ToolRegistry};
use crate::clinic::fixture::name_matches;

#[derive(Debug, Clone, Default)]
pub struct DispatchEngine {
    registry: ToolRegistry,
}

impl DispatchEngine {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Single step
    ///
    /// The first step takes no observation. Every step after a `CallTool`
    /// decision takes that call's observation.
    pub fn step(
        &self,
        state: &AgentState,
        observation: Option<ToolInvocation>,
    ) -> Result<Transition, AgentError> {
        match (state.phase, observation) {
            (Phase::Think, None) => self.think(state),
            (Phase::Act, Some(observation)) => {
                Ok(self.observe(state.clone().with_observation(observation)))
            }
            (Phase::Finished | Phase::Aborted, _) => Err(AgentError::Finished),
            (phase, _) => Err(AgentError::UnexpectedInput { phase }),
        }
    }

    fn think(&self, state: &AgentState) -> Result<Transition, AgentError> {
        let entities = &state.entities;
        match entities.intent.route() {
            IntentRoute::Recall => Ok(Transition::new(
                state.clone().with_phase(Phase::Finished),
                AgentDecision::Recall,
            )),
            IntentRoute::LanguageModel => Ok(Transition::new(
                state.clone().with_phase(Phase::Finished),
                AgentDecision::AskLanguageModel,
            )),
            IntentRoute::Tool => {
                let tool = self.registry.primary_tool(entities.intent)?;
                let reference = entities.patient_reference.clone();
                if tool.requires_patient() && reference.is_none() {
                    return Ok(Transition::finish(state.clone(), FinishReason::NeedsPatient));
                }
                let input = ToolInput::new(reference, entities.parameters.clone());
                let planned = state.clone().with_plan(tool, input.clone());
                Ok(self.act(planned, tool, input))
            }
        }
    }

    fn act(&self, state: AgentState, tool: Tool, input: ToolInput) -> Transition {
        if state.at_limit() {
            return Transition::finish(state, FinishReason::BestEffort);
        }
        Transition::new(
            state.with_action(input.clone()),
            AgentDecision::CallTool { tool, input },
        )
    }

    fn observe(&self, state: AgentState) -> Transition {
        let Some(last) = state.last_observation().cloned() else {
            return Transition::finish(state, FinishReason::BestEffort);
        };
        let Some(error) = last.error().cloned() else {
            if let Some(reason) = Self::contradicted_name(&state, &last) {
                return Transition::finish(state, reason);
            }
            return Transition::finish(state, FinishReason::Answered);
        };

        match error {
            ToolError::NotFound { reference } => {
                if state.can_retry() {
                    let (state, next) = state.with_next_fallback();
                    if let Some(next) = next {
                        let input = last.input.with_reference(next);
                        return self.act(state.with_retry(), last.tool, input);
                    }
                    return Transition::finish(state, FinishReason::NotFound { reference });
                }
                Transition::finish(state, FinishReason::NotFound { reference })
            }
            ToolError::Ambiguous {
                reference,
                candidates,
            } => Transition::finish(
                state,
                FinishReason::Ambiguous {
                    reference,
                    candidates,
                },
            ),
            ToolError::PatientRequired => Transition::finish(state, FinishReason::NeedsPatient),
            error if error.is_transient() && state.can_retry() => {
                self.act(state.with_retry(), last.tool, last.input)
            }
            error => Transition::finish(state, FinishReason::Failed { error }),
        }
    }

    /// An identifier-only fallback that landed on a patient whose name is
    /// not the one the clinician gave.
    fn contradicted_name(state: &AgentState, last: &ToolInvocation) -> Option<FinishReason> {
        let Some(PatientReference::Combined { name, identifier }) = &state.entities.patient_reference
        else {
            return None;
        };
        if !matches!(last.input.patient_reference, Some(PatientReference::Identifier { .. })) {
            return None;
        }
        let found = last.output()?.patient.as_ref()?;
        if name_matches(&found.name, name) {
            return None;
        }
        Some(FinishReason::ReferenceMismatch {
            name: name.clone(),
            identifier: identifier.clone(),
            found: found.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::cognition::{LoopLimits, LoopOutcome};
    use crate::agent::intent::{ExtractedEntities, Intent, Parameters, PatientReference};
    use crate::agent::cognition::Transition;
    use crate::agent::composer::ResponseComposer;
    use crate::agent::tools::{CensusReport, ToolData, ToolOutput};
    use crate::clinic::PatientSummary;

    fn entities(intent: Intent, reference: Option<PatientReference>) -> ExtractedEntities {
        ExtractedEntities {
            intent,
            patient_reference: reference,
            reference_from_context: false,
            parameters: Parameters::default(),
        }
    }

    fn observe(state: &AgentState, result: Result<ToolOutput, ToolError>) -> ToolInvocation {
        ToolInvocation::new(
            state.iteration,
            state.tool.unwrap_or(Tool::PatientCensus),
            state.input.clone(),
            result,
            0,
        )
    }

    fn upstream() -> ToolError {
        ToolError::Upstream {
            operation: "list_goals".to_string(),
            message: "connection refused".to_string(),
        }
    }

    fn not_found(reference: &str) -> ToolError {
        ToolError::NotFound {
            reference: reference.to_string(),
        }
    }

    #[test]
    fn test_routes_intent_to_primary_tool() {
        let engine = DispatchEngine::default();
        let state = AgentState::new(
            entities(Intent::PatientGoals, Some(PatientReference::identifier("5"))),
            LoopLimits::default(),
        );
        let t = engine.step(&state, None).unwrap();
        match t.decision {
            AgentDecision::CallTool { tool, input } => {
                assert_eq!(tool, Tool::GoalTracking);
                assert_eq!(input.patient_reference, Some(PatientReference::identifier("5")));
            }
            other => panic!("expected a tool call, got {:?}", other),
        }
        assert_eq!(t.next_state.iteration, 1);
        assert_eq!(t.next_state.phase, Phase::Act);
    }

    #[test]
    fn test_fallback_intents_skip_tools() {
        let engine = DispatchEngine::default();
        for (intent, expected) in [
            (Intent::ConversationRecall, AgentDecision::Recall),
            (Intent::GeneralQuestion, AgentDecision::AskLanguageModel),
            (Intent::Unknown, AgentDecision::AskLanguageModel),
        ] {
            let state = AgentState::new(entities(intent, None), LoopLimits::default());
            let t = engine.step(&state, None).unwrap();
            assert_eq!(t.decision, expected);
            assert_eq!(t.next_state.iteration, 0);
        }
    }

    #[test]
    fn test_missing_patient_asks_for_one() {
        let engine = DispatchEngine::default();
        let state = AgentState::new(entities(Intent::BudgetInfo, None), LoopLimits::default());
        let t = engine.step(&state, None).unwrap();
        assert_eq!(t.decision, AgentDecision::Finish(FinishReason::NeedsPatient));
        assert!(t.next_state.is_terminal());
    }

    #[test]
    fn test_combined_not_found_falls_back_identifier_then_name() {
        let engine = DispatchEngine::default();
        let mut state = AgentState::new(
            entities(
                Intent::PatientGoals,
                Some(PatientReference::combined("Smith", "999999")),
            ),
            LoopLimits {
                max_iterations: 5,
                retry_budget: 3,
            },
        );
        let mut tried = Vec::new();
        let mut observation = None;
        loop {
            let t = engine.step(&state, observation.take()).unwrap();
            state = t.next_state;
            match t.decision {
                AgentDecision::CallTool { input, .. } => {
                    let reference = input.patient_reference.clone().unwrap();
                    tried.push(reference.clone());
                    observation = Some(observe(&state, Err(not_found(&reference.describe()))));
                }
                AgentDecision::Finish(reason) => {
                    assert!(matches!(reason, FinishReason::NotFound { .. }));
                    break;
                }
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(
            tried,
            vec![
                PatientReference::combined("Smith", "999999"),
                PatientReference::identifier("999999"),
                PatientReference::name("Smith"),
            ]
        );
        assert_eq!(state.retries_used, 2);
    }

    fn goals_for(patient: PatientSummary) -> ToolOutput {
        ToolOutput {
            tool: Tool::GoalTracking,
            patient: Some(patient),
            data: ToolData::Census(CensusReport {
                total: 0,
                active: 0,
                inactive: 0,
            }),
        }
    }

    fn john_smith() -> PatientSummary {
        PatientSummary {
            id: 2,
            identifier: "123456".to_string(),
            name: "John Smith".to_string(),
        }
    }

    #[test]
    fn test_identifier_fallback_on_another_patient_asks_instead_of_answering() {
        let engine = DispatchEngine::default();
        let state = AgentState::new(
            entities(
                Intent::PatientGoals,
                Some(PatientReference::combined("Amira Radwan", "123456")),
            ),
            LoopLimits::default(),
        );
        let acting = engine.step(&state, None).unwrap().next_state;
        let obs = observe(&acting, Err(not_found("Amira Radwan-123456")));
        let t = engine.step(&acting, Some(obs)).unwrap();
        assert_eq!(
            t.next_state.input.patient_reference,
            Some(PatientReference::identifier("123456"))
        );

        let obs = observe(&t.next_state, Ok(goals_for(john_smith())));
        let t = engine.step(&t.next_state, Some(obs)).unwrap();
        assert_eq!(
            t.decision,
            AgentDecision::Finish(FinishReason::ReferenceMismatch {
                name: "Amira Radwan".to_string(),
                identifier: "123456".to_string(),
                found: john_smith(),
            })
        );
    }

    #[test]
    fn test_identifier_fallback_with_matching_name_answers() {
        let engine = DispatchEngine::default();
        let state = AgentState::new(
            entities(
                Intent::PatientGoals,
                Some(PatientReference::combined("Smith", "123456")),
            ),
            LoopLimits::default(),
        );
        let acting = engine.step(&state, None).unwrap().next_state;
        let obs = observe(&acting, Err(not_found("Smith-123456")));
        let retrying = engine.step(&acting, Some(obs)).unwrap().next_state;
        let obs = observe(&retrying, Ok(goals_for(john_smith())));
        let t = engine.step(&retrying, Some(obs)).unwrap();
        assert_eq!(t.decision, AgentDecision::Finish(FinishReason::Answered));
    }

    #[test]
    fn test_mixed_failure_sequences_always_terminate() {
        let timeout = || ToolError::Timeout {
            operation: "list_goals".to_string(),
            after_ms: 50,
        };
        let sequences: Vec<Vec<ToolError>> = vec![
            vec![not_found("x"), timeout(), upstream(), not_found("x")],
            vec![upstream(), not_found("x"), timeout(), timeout(), upstream()],
            vec![timeout(), ToolError::validation("bad field")],
            vec![not_found("x"), ToolError::validation("bad field"), upstream()],
            vec![upstream(), upstream(), upstream(), upstream(), upstream(), upstream()],
            vec![timeout(), not_found("x"), not_found("x"), not_found("x")],
        ];
        let composer = ResponseComposer::default();

        for limits in [
            LoopLimits::default(),
            LoopLimits {
                max_iterations: 2,
                retry_budget: 5,
            },
            LoopLimits {
                max_iterations: 6,
                retry_budget: 0,
            },
        ] {
            for (i, failures) in sequences.iter().enumerate() {
                for reference in [
                    PatientReference::identifier("5"),
                    PatientReference::combined("Radwan", "563004"),
                ] {
                    let mut state = AgentState::new(
                        entities(Intent::PatientGoals, Some(reference)),
                        limits,
                    );
                    let mut observation = None;
                    let mut failures = failures.iter().cloned();
                    let mut steps = 0;
                    let reason = loop {
                        steps += 1;
                        assert!(steps <= 2 * limits.max_iterations + 2, "sequence {} did not stop", i);
                        let t = engine_step(&state, observation.take());
                        state = t.next_state;
                        match t.decision {
                            AgentDecision::CallTool { .. } => {
                                let result = failures.next().map_or_else(
                                    || Ok(goals_for(john_smith())),
                                    Err,
                                );
                                observation = Some(observe(&state, result));
                            }
                            AgentDecision::Finish(reason) => break reason,
                            other => panic!("unexpected {:?}", other),
                        }
                    };
                    assert!(state.iteration <= limits.max_iterations, "sequence {}", i);
                    assert!(state.is_terminal());
                    assert!(!composer.compose(&state, &reason).trim().is_empty(), "sequence {}", i);
                }
            }
        }
    }

    fn engine_step(state: &AgentState, observation: Option<ToolInvocation>) -> Transition {
        DispatchEngine::default().step(state, observation).unwrap()
    }

    #[test]
    fn test_transient_errors_retry_within_budget() {
        let engine = DispatchEngine::default();
        let mut state = AgentState::new(
            entities(Intent::PatientGoals, Some(PatientReference::identifier("5"))),
            LoopLimits {
                max_iterations: 10,
                retry_budget: 2,
            },
        );
        let mut observation = None;
        let mut calls = 0;
        let reason = loop {
            let t = engine.step(&state, observation.take()).unwrap();
            state = t.next_state;
            match t.decision {
                AgentDecision::CallTool { .. } => {
                    calls += 1;
                    observation = Some(observe(&state, Err(upstream())));
                }
                AgentDecision::Finish(reason) => break reason,
                other => panic!("unexpected {:?}", other),
            }
        };
        assert_eq!(calls, 3);
        assert_eq!(reason, FinishReason::Failed { error: upstream() });
        assert_eq!(reason.outcome(), LoopOutcome::Finished);
    }

    #[test]
    fn test_iteration_cap_finishes_best_effort() {
        let engine = DispatchEngine::default();
        let state = AgentState::new(
            entities(Intent::PatientGoals, Some(PatientReference::identifier("5"))),
            LoopLimits {
                max_iterations: 1,
                retry_budget: 5,
            },
        );
        let t = engine.step(&state, None).unwrap();
        let obs = observe(&t.next_state, Err(upstream()));
        let t = engine.step(&t.next_state, Some(obs)).unwrap();
        assert_eq!(t.decision, AgentDecision::Finish(FinishReason::BestEffort));
        assert_eq!(FinishReason::BestEffort.outcome(), LoopOutcome::MaxIterationsExceeded);
        assert_eq!(t.next_state.iteration, 1);
        assert!(t.next_state.best_observation().is_some());
    }

    #[test]
    fn test_validation_and_ambiguity_finish_immediately() {
        let engine = DispatchEngine::default();
        let state = AgentState::new(
            entities(Intent::PatientGoals, Some(PatientReference::name("John"))),
            LoopLimits::default(),
        );
        let acting = engine.step(&state, None).unwrap().next_state;

        let candidates = vec![PatientSummary {
            id: 2,
            identifier: "123456".to_string(),
            name: "John Smith".to_string(),
        }];
        let obs = observe(
            &acting,
            Err(ToolError::Ambiguous {
                reference: "John".to_string(),
                candidates: candidates.clone(),
            }),
        );
        let t = engine.step(&acting, Some(obs)).unwrap();
        assert!(matches!(t.decision, AgentDecision::Finish(FinishReason::Ambiguous { .. })));

        let obs = observe(&acting, Err(ToolError::validation("bad field")));
        let t = engine.step(&acting, Some(obs)).unwrap();
        assert_eq!(
            t.decision,
            AgentDecision::Finish(FinishReason::Failed {
                error: ToolError::validation("bad field")
            })
        );
    }

    #[test]
    fn test_missing_route_is_fatal() {
        use crate::agent::tools::RegistryError;

        let engine = DispatchEngine::new(ToolRegistry::unchecked([(
            Intent::PatientCount,
            Tool::PatientCensus,
        )]));
        let state = AgentState::new(
            entities(Intent::BudgetInfo, Some(PatientReference::identifier("5"))),
            LoopLimits::default(),
        );
        let err = engine.step(&state, None).unwrap_err();
        assert_eq!(
            err,
            AgentError::Registry(RegistryError::MissingRoute {
                intent: Intent::BudgetInfo
            })
        );
    }

    #[test]
    fn test_finished_state_rejects_steps() {
        let engine = DispatchEngine::default();
        let state = AgentState::new(entities(Intent::Unknown, None), LoopLimits::default())
            .with_phase(Phase::Finished);
        assert_eq!(engine.step(&state, None).unwrap_err(), AgentError::Finished);
    }
}

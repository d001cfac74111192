//! Clinical agent
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SESSION          Orchestration layer (async)               │
//! │  - AgentSession: runs one request against real tools        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  TOOLS            Read-only clinic data tools               │
//! │  - ToolRegistry: intent -> tool routing                     │
//! │  - CallPolicy: timeout and bounded retry per call           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  COGNITION        Pure state machine (no async/IO)          │
//! │  - DispatchEngine: (state, observation) -> Transition       │
//! │  - AgentState: immutable snapshot with scratchpad           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  INTENT           Rule table and entity extraction          │
//! │  COMPOSER         Final answer text                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Rules
//!
//! 1. **Cognition is pure**: no async, no IO
//! 2. **Session orchestrates**: it alone calls tools and the language model
//! 3. **Failures are observations**: tool errors never escape the loop

#![forbid(unsafe_code)]

pub mod cognition;
pub mod composer;
pub mod intent;
pub mod session;
pub mod tools;

pub use cognition::{
    AgentDecision, AgentError, AgentState, DispatchEngine, FinishReason, LoopLimits, LoopOutcome,
    ToolInvocation, ToolOutcome, Transition,
};
pub use composer::ResponseComposer;
pub use intent::{ExtractedEntities, Intent, IntentExtractor, PatientReference};
pub use session::{AgentReply, AgentSession, SessionDeps};
pub use tools::{Tool, ToolContext, ToolError, ToolInput, ToolOutput, ToolRegistry};

//! Loop-fatal errors
//!
//! Tool failures are observations, not errors. Only a broken contract stops
//! the loop.

use thiserror::Error;

use super::state::Phase;
use crate::agent::tools::RegistryError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Stepped a loop that already finished
    #[error("agent loop already finished")]
    Finished,

    /// Stepped with or without an observation when the phase expects the opposite
    #[error("unexpected input in {phase:?} phase")]
    UnexpectedInput { phase: Phase },
}

//! Clinic data collaborators
//!
//! Read-only access to the practice-management store. The assistant core
//! only ever talks to these through [`ClinicData`]; the store itself
//! (persistence, CRUD, migrations) lives outside this crate.

pub mod fixture;
pub mod records;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;
use thiserror::Error;

pub use fixture::{ClinicSnapshot, InMemoryClinic};
pub use records::{
    Attendance, BudgetItem, BudgetSettings, DateRange, Goal, GoalStatus, Patient, PatientId,
    PatientSummary, RecordFilter, StrategyUsage, TherapySession,
};

/// How a patient is looked up
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatientLookup {
    /// Record number or primary key
    Identifier(String),
    /// Whole-word, case-insensitive name match
    Name(String),
}

/// Failures reported by a clinic data backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClinicError {
    /// Backend could not be reached; worth retrying
    #[error("clinic data unavailable: {message}")]
    Unavailable { message: String },

    /// Backend answered with an error; retrying will not help
    #[error("clinic data backend error: {message}")]
    Backend { message: String },
}

impl ClinicError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }

    /// Check if error is retryable (transient)
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Read-only contract over the practice-management store.
///
/// Every listing is scoped to one patient and accepts the optional
/// date/category filter; implementations apply the filter server-side.
#[async_trait]
pub trait ClinicData: Send + Sync {
    async fn find_patients(&self, lookup: &PatientLookup) -> Result<Vec<Patient>, ClinicError>;

    async fn list_patients(&self) -> Result<Vec<Patient>, ClinicError>;

    async fn list_goals(
        &self,
        patient: PatientId,
        filter: &RecordFilter,
    ) -> Result<Vec<Goal>, ClinicError>;

    async fn list_budget_items(
        &self,
        patient: PatientId,
        filter: &RecordFilter,
    ) -> Result<Vec<BudgetItem>, ClinicError>;

    async fn budget_settings(&self, patient: PatientId)
        -> Result<Option<BudgetSettings>, ClinicError>;

    async fn list_sessions(
        &self,
        patient: PatientId,
        filter: &RecordFilter,
    ) -> Result<Vec<TherapySession>, ClinicError>;

    async fn list_strategy_usage(
        &self,
        patient: PatientId,
        filter: &RecordFilter,
    ) -> Result<Vec<StrategyUsage>, ClinicError>;
}

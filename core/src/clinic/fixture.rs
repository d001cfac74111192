//! In-memory clinic data
//!
//! Serves a JSON snapshot of the practice store. Used by the binary when no
//! live backend is configured and by the test suites.

use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::records::*;
use super::{ClinicData, ClinicError, PatientLookup};

/// Serialized form of the whole store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClinicSnapshot {
    #[serde(default)]
    pub patients: Vec<Patient>,
    #[serde(default)]
    pub goals: Vec<Goal>,
    #[serde(default)]
    pub budget_items: Vec<BudgetItem>,
    #[serde(default)]
    pub budget_settings: Vec<BudgetSettings>,
    #[serde(default)]
    pub sessions: Vec<TherapySession>,
    #[serde(default)]
    pub strategy_usage: Vec<StrategyUsage>,
}

impl ClinicSnapshot {
    /// Load from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read clinic data from {}", path.display()))?;
        let snapshot: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse clinic data in {}", path.display()))?;
        Ok(snapshot)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse clinic data")
    }
}

/// Read-only store backed by a snapshot held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryClinic {
    snapshot: ClinicSnapshot,
}

impl InMemoryClinic {
    pub fn new(snapshot: ClinicSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let snapshot = ClinicSnapshot::from_file(path)?;
        debug!(
            "Loaded clinic snapshot: {} patients, {} goals, {} sessions",
            snapshot.patients.len(),
            snapshot.goals.len(),
            snapshot.sessions.len()
        );
        Ok(Self::new(snapshot))
    }

    pub fn snapshot(&self) -> &ClinicSnapshot {
        &self.snapshot
    }
}

/// Split a name into lowercase whole-word tokens
fn name_tokens(name: &str) -> Vec<String> {
    name.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| c.is_ascii_punctuation() && c != '\'' && c != '-')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Every query token must appear as a whole token of the patient name
pub(crate) fn name_matches(patient_name: &str, query: &str) -> bool {
    let wanted = name_tokens(query);
    if wanted.is_empty() {
        return false;
    }
    let have = name_tokens(patient_name);
    wanted.iter().all(|w| have.contains(w))
}

#[async_trait]
impl ClinicData for InMemoryClinic {
    async fn find_patients(&self, lookup: &PatientLookup) -> Result<Vec<Patient>, ClinicError> {
        let found = match lookup {
            PatientLookup::Identifier(value) => {
                let value = value.trim().trim_start_matches('#');
                self.snapshot
                    .patients
                    .iter()
                    .filter(|p| p.identifier == value || p.id.to_string() == value)
                    .cloned()
                    .collect()
            }
            PatientLookup::Name(name) => self
                .snapshot
                .patients
                .iter()
                .filter(|p| name_matches(&p.name, name))
                .cloned()
                .collect(),
        };
        Ok(found)
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, ClinicError> {
        Ok(self.snapshot.patients.clone())
    }

    async fn list_goals(
        &self,
        patient: PatientId,
        filter: &RecordFilter,
    ) -> Result<Vec<Goal>, ClinicError> {
        Ok(self
            .snapshot
            .goals
            .iter()
            .filter(|g| g.patient_id == patient)
            .filter(|g| filter.admits_category(&g.category))
            .filter(|g| filter.admits_date(g.target_date.unwrap_or(g.created_on)))
            .cloned()
            .collect())
    }

    async fn list_budget_items(
        &self,
        patient: PatientId,
        filter: &RecordFilter,
    ) -> Result<Vec<BudgetItem>, ClinicError> {
        Ok(self
            .snapshot
            .budget_items
            .iter()
            .filter(|i| i.patient_id == patient)
            .filter(|i| filter.admits_category(&i.category))
            .filter(|i| filter.admits_date(i.date))
            .cloned()
            .collect())
    }

    async fn budget_settings(
        &self,
        patient: PatientId,
    ) -> Result<Option<BudgetSettings>, ClinicError> {
        Ok(self
            .snapshot
            .budget_settings
            .iter()
            .find(|s| s.patient_id == patient)
            .cloned())
    }

    async fn list_sessions(
        &self,
        patient: PatientId,
        filter: &RecordFilter,
    ) -> Result<Vec<TherapySession>, ClinicError> {
        Ok(self
            .snapshot
            .sessions
            .iter()
            .filter(|s| s.patient_id == patient)
            .filter(|s| filter.admits_date(s.date))
            .cloned()
            .collect())
    }

    async fn list_strategy_usage(
        &self,
        patient: PatientId,
        filter: &RecordFilter,
    ) -> Result<Vec<StrategyUsage>, ClinicError> {
        Ok(self
            .snapshot
            .strategy_usage
            .iter()
            .filter(|u| u.patient_id == patient)
            .filter(|u| filter.admits_date(u.date))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clinic::testing::sample_snapshot;

    #[test]
    fn test_name_matching_is_whole_word() {
        assert!(name_matches("Amira Radwan", "radwan"));
        assert!(name_matches("John Smith", "John Smith"));
        assert!(!name_matches("John Smithers", "Smith"));
        assert!(name_matches("Mary-Jane Doyle", "Mary-Jane"));
        assert!(!name_matches("Amira Radwan", ""));
    }

    #[tokio::test]
    async fn test_identifier_matches_record_number_or_primary_key() {
        let clinic = InMemoryClinic::new(sample_snapshot());

        let by_number = clinic
            .find_patients(&PatientLookup::Identifier("563004".to_string()))
            .await
            .unwrap();
        assert_eq!(by_number.len(), 1);
        assert_eq!(by_number[0].name, "Amira Radwan");

        let by_key = clinic
            .find_patients(&PatientLookup::Identifier("5".to_string()))
            .await
            .unwrap();
        assert_eq!(by_key.len(), 1);
        assert_eq!(by_key[0].id, 5);
    }

    #[tokio::test]
    async fn test_listing_applies_filter() {
        let clinic = InMemoryClinic::new(sample_snapshot());
        let filter = RecordFilter {
            range: None,
            category: Some("therapy".to_string()),
        };
        let items = clinic.list_budget_items(5, &filter).await.unwrap();
        assert!(!items.is_empty());
        assert!(items.iter().all(|i| i.category == "therapy"));
    }

    #[test]
    fn test_snapshot_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clinic.json");
        std::fs::write(&path, serde_json::to_string(&sample_snapshot()).unwrap()).unwrap();

        let clinic = InMemoryClinic::from_file(&path).unwrap();
        assert_eq!(clinic.snapshot().patients.len(), sample_snapshot().patients.len());
    }
}

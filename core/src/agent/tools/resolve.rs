//! Patient reference resolution

use tracing::debug;

use super::{ToolContext, ToolError};
use crate::agent::intent::PatientReference;
use crate::clinic::fixture::name_matches;
use crate::clinic::{Patient, PatientLookup};

#[derive(Debug, Clone, PartialEq)]
pub enum PatientResolution {
    None,
    Unique(Patient),
    Ambiguous(Vec<Patient>),
}

impl PatientResolution {
    fn from_matches(mut patients: Vec<Patient>) -> Self {
        match patients.len() {
            0 => Self::None,
            1 => Self::Unique(patients.remove(0)),
            _ => {
                patients.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
                Self::Ambiguous(patients)
            }
        }
    }
}

/// Look a reference up in the clinic store.
///
/// A combined reference matches only patients whose identifier matches and
/// whose name contains the given name.
pub async fn resolve(ctx: &ToolContext, reference: &PatientReference) -> Result<PatientResolution, ToolError> {
    let matches = match reference {
        PatientReference::Identifier { value } => {
            let lookup = PatientLookup::Identifier(value.clone());
            ctx.policy
                .call("find_patients", || ctx.data.find_patients(&lookup))
                .await?
        }
        PatientReference::Name { value } => {
            let lookup = PatientLookup::Name(value.clone());
            ctx.policy
                .call("find_patients", || ctx.data.find_patients(&lookup))
                .await?
        }
        PatientReference::Combined { name, identifier } => {
            let lookup = PatientLookup::Identifier(identifier.clone());
            ctx.policy
                .call("find_patients", || ctx.data.find_patients(&lookup))
                .await?
                .into_iter()
                .filter(|p| name_matches(&p.name, name))
                .collect()
        }
    };
    debug!("{} resolved to {} patient(s)", reference.describe(), matches.len());
    Ok(PatientResolution::from_matches(matches))
}

/// Resolve to exactly one patient or explain why not
pub async fn require_patient(
    ctx: &ToolContext,
    reference: Option<&PatientReference>,
) -> Result<Patient, ToolError> {
    let reference = reference.ok_or(ToolError::PatientRequired)?;
    match resolve(ctx, reference).await? {
        PatientResolution::Unique(patient) => Ok(patient),
        PatientResolution::None => Err(ToolError::NotFound {
            reference: reference.describe(),
        }),
        PatientResolution::Ambiguous(patients) => Err(ToolError::Ambiguous {
            reference: reference.describe(),
            candidates: patients.iter().map(Patient::summary).collect(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tools::CallPolicy;
    use crate::clinic::testing::sample_clinic;

    fn ctx() -> ToolContext {
        ToolContext::new(sample_clinic(), CallPolicy::default())
    }

    #[tokio::test]
    async fn test_identifier_resolves_uniquely() {
        let patient = require_patient(&ctx(), Some(&PatientReference::identifier("123456")))
            .await
            .unwrap();
        assert_eq!(patient.name, "John Smith");
    }

    #[tokio::test]
    async fn test_shared_first_name_is_ambiguous() {
        let err = require_patient(&ctx(), Some(&PatientReference::name("John")))
            .await
            .unwrap_err();
        match err {
            ToolError::Ambiguous { candidates, .. } => {
                let names: Vec<&str> = candidates.iter().map(|c| c.name.as_str()).collect();
                assert_eq!(names, vec!["John Carter", "John Smith"]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_combined_requires_both_halves() {
        let ctx = ctx();
        let found = resolve(&ctx, &PatientReference::combined("Radwan", "563004"))
            .await
            .unwrap();
        assert!(matches!(found, PatientResolution::Unique(ref p) if p.name == "Amira Radwan"));

        let wrong_name = resolve(&ctx, &PatientReference::combined("Smith", "563004"))
            .await
            .unwrap();
        assert_eq!(wrong_name, PatientResolution::None);
    }

    #[tokio::test]
    async fn test_missing_reference_and_unknown_patient() {
        let ctx = ctx();
        assert_eq!(
            require_patient(&ctx, None).await.unwrap_err(),
            ToolError::PatientRequired
        );
        let err = require_patient(&ctx, Some(&PatientReference::identifier("999999")))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}

//! Shared fixtures for unit tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use parking_lot::Mutex;

use super::records::*;
use super::{ClinicData, ClinicError, ClinicSnapshot, InMemoryClinic, PatientLookup};

pub(crate) fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Fixed "today" the sample data is written against
pub(crate) fn today() -> NaiveDate {
    d(2024, 6, 30)
}

fn patient(id: PatientId, identifier: &str, name: &str, active: bool) -> Patient {
    Patient {
        id,
        identifier: identifier.to_string(),
        name: name.to_string(),
        date_of_birth: None,
        active,
        clinician: None,
        enrolled_on: None,
    }
}

fn goal(
    id: u64,
    patient_id: PatientId,
    title: &str,
    category: &str,
    status: GoalStatus,
    progress: u8,
    created_on: NaiveDate,
    target_date: Option<NaiveDate>,
) -> Goal {
    Goal {
        id,
        patient_id,
        title: title.to_string(),
        category: category.to_string(),
        status,
        progress,
        created_on,
        target_date,
    }
}

fn item(id: u64, patient_id: PatientId, category: &str, description: &str, amount: f64, date: NaiveDate) -> BudgetItem {
    BudgetItem {
        id,
        patient_id,
        category: category.to_string(),
        description: description.to_string(),
        amount,
        date,
    }
}

fn session(id: u64, patient_id: PatientId, date: NaiveDate, minutes: u32, attendance: Attendance, engagement: Option<u8>) -> TherapySession {
    TherapySession {
        id,
        patient_id,
        date,
        duration_minutes: minutes,
        attendance,
        engagement,
        notes: None,
    }
}

fn usage(patient_id: PatientId, session_id: u64, strategy: &str, date: NaiveDate, effectiveness: Option<u8>) -> StrategyUsage {
    StrategyUsage {
        patient_id,
        session_id,
        strategy: strategy.to_string(),
        date,
        effectiveness,
    }
}

/// Six patients; two share the surname Radwan and two the first name John.
pub(crate) fn sample_snapshot() -> ClinicSnapshot {
    let mut amira = patient(1, "563004", "Amira Radwan", true);
    amira.date_of_birth = Some(d(2016, 3, 12));
    amira.clinician = Some("Dr. Lee".to_string());
    amira.enrolled_on = Some(d(2023, 2, 1));

    ClinicSnapshot {
        patients: vec![
            amira,
            patient(2, "123456", "John Smith", true),
            patient(3, "234567", "John Carter", true),
            patient(4, "345678", "Maya Chen", false),
            patient(5, "456789", "Liam O'Brien", true),
            patient(6, "567890", "Sara Radwan", true),
        ],
        goals: vec![
            goal(1, 5, "Improve expressive vocabulary", "communication", GoalStatus::InProgress, 60, d(2024, 1, 10), Some(d(2024, 9, 30))),
            goal(2, 5, "Independent dressing", "self-care", GoalStatus::Achieved, 100, d(2023, 11, 1), Some(d(2024, 4, 30))),
            goal(3, 5, "Manage school transitions", "behaviour", GoalStatus::InProgress, 35, d(2024, 2, 15), Some(d(2024, 12, 31))),
            goal(4, 1, "Fine motor handwriting", "motor", GoalStatus::InProgress, 50, d(2024, 3, 1), Some(d(2024, 8, 31))),
            goal(5, 1, "Turn-taking in group play", "social", GoalStatus::NotStarted, 0, d(2024, 6, 1), None),
        ],
        budget_items: vec![
            item(1, 5, "therapy", "Speech therapy block", 1800.0, d(2024, 2, 10)),
            item(2, 5, "therapy", "Occupational therapy block", 2200.0, d(2024, 5, 20)),
            item(3, 5, "equipment", "Sensory kit", 650.5, d(2024, 3, 5)),
            item(4, 5, "transport", "Taxi to clinic", 120.0, d(2024, 6, 12)),
            item(5, 1, "therapy", "Handwriting program", 1500.0, d(2024, 4, 2)),
        ],
        budget_settings: vec![
            BudgetSettings {
                patient_id: 5,
                total_funding: 12000.0,
                plan_start: d(2024, 1, 1),
                plan_end: d(2024, 12, 31),
            },
            BudgetSettings {
                patient_id: 1,
                total_funding: 8000.0,
                plan_start: d(2024, 1, 1),
                plan_end: d(2024, 12, 31),
            },
        ],
        sessions: vec![
            session(101, 5, d(2024, 6, 3), 60, Attendance::Attended, Some(4)),
            session(102, 5, d(2024, 6, 10), 60, Attendance::Attended, Some(3)),
            session(103, 5, d(2024, 6, 17), 45, Attendance::Cancelled, None),
            session(104, 5, d(2024, 6, 24), 60, Attendance::Attended, Some(5)),
            session(105, 5, d(2024, 5, 27), 60, Attendance::NoShow, None),
            session(201, 1, d(2024, 6, 20), 45, Attendance::Attended, Some(4)),
        ],
        strategy_usage: vec![
            usage(5, 101, "visual schedule", d(2024, 6, 3), Some(4)),
            usage(5, 101, "first-then board", d(2024, 6, 3), Some(3)),
            usage(5, 102, "visual schedule", d(2024, 6, 10), Some(5)),
            usage(5, 104, "visual schedule", d(2024, 6, 24), Some(4)),
            usage(5, 104, "deep pressure", d(2024, 6, 24), Some(2)),
        ],
    }
}

pub(crate) fn sample_clinic() -> Arc<InMemoryClinic> {
    Arc::new(InMemoryClinic::new(sample_snapshot()))
}

/// Wraps the sample store and records every call it receives
pub(crate) struct RecordingClinic {
    inner: InMemoryClinic,
    pub calls: Mutex<Vec<String>>,
}

impl RecordingClinic {
    pub fn new() -> Self {
        Self {
            inner: InMemoryClinic::new(sample_snapshot()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().push(call);
    }
}

#[async_trait]
impl ClinicData for RecordingClinic {
    async fn find_patients(&self, lookup: &PatientLookup) -> Result<Vec<Patient>, ClinicError> {
        self.record(format!("find_patients {:?}", lookup));
        self.inner.find_patients(lookup).await
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, ClinicError> {
        self.record("list_patients".to_string());
        self.inner.list_patients().await
    }

    async fn list_goals(&self, patient: PatientId, filter: &RecordFilter) -> Result<Vec<Goal>, ClinicError> {
        self.record(format!("list_goals {}", patient));
        self.inner.list_goals(patient, filter).await
    }

    async fn list_budget_items(&self, patient: PatientId, filter: &RecordFilter) -> Result<Vec<BudgetItem>, ClinicError> {
        self.record(format!("list_budget_items {}", patient));
        self.inner.list_budget_items(patient, filter).await
    }

    async fn budget_settings(&self, patient: PatientId) -> Result<Option<BudgetSettings>, ClinicError> {
        self.record(format!("budget_settings {}", patient));
        self.inner.budget_settings(patient).await
    }

    async fn list_sessions(&self, patient: PatientId, filter: &RecordFilter) -> Result<Vec<TherapySession>, ClinicError> {
        self.record(format!("list_sessions {}", patient));
        self.inner.list_sessions(patient, filter).await
    }

    async fn list_strategy_usage(&self, patient: PatientId, filter: &RecordFilter) -> Result<Vec<StrategyUsage>, ClinicError> {
        self.record(format!("list_strategy_usage {}", patient));
        self.inner.list_strategy_usage(patient, filter).await
    }
}

/// How a [`FailingClinic`] misbehaves
#[derive(Debug, Clone, Copy)]
pub(crate) enum FailureMode {
    /// Every call reports the backend unreachable
    Unavailable,
    /// Every call returns a non-retryable backend error
    Backend,
    /// Every call sleeps for the given duration before answering
    Hang(Duration),
    /// The first N calls are unavailable, later calls succeed
    FlakyFirst(usize),
}

/// Failure-injecting wrapper over the sample store
pub(crate) struct FailingClinic {
    inner: InMemoryClinic,
    mode: FailureMode,
    calls: AtomicUsize,
}

impl FailingClinic {
    pub fn new(mode: FailureMode) -> Self {
        Self {
            inner: InMemoryClinic::new(sample_snapshot()),
            mode,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn gate(&self) -> Result<(), ClinicError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        match self.mode {
            FailureMode::Unavailable => Err(ClinicError::unavailable("connection refused")),
            FailureMode::Backend => Err(ClinicError::backend("query rejected")),
            FailureMode::Hang(duration) => {
                tokio::time::sleep(duration).await;
                Ok(())
            }
            FailureMode::FlakyFirst(failures) if n < failures => {
                Err(ClinicError::unavailable("connection reset"))
            }
            FailureMode::FlakyFirst(_) => Ok(()),
        }
    }
}

#[async_trait]
impl ClinicData for FailingClinic {
    async fn find_patients(&self, lookup: &PatientLookup) -> Result<Vec<Patient>, ClinicError> {
        self.gate().await?;
        self.inner.find_patients(lookup).await
    }

    async fn list_patients(&self) -> Result<Vec<Patient>, ClinicError> {
        self.gate().await?;
        self.inner.list_patients().await
    }

    async fn list_goals(&self, patient: PatientId, filter: &RecordFilter) -> Result<Vec<Goal>, ClinicError> {
        self.gate().await?;
        self.inner.list_goals(patient, filter).await
    }

    async fn list_budget_items(&self, patient: PatientId, filter: &RecordFilter) -> Result<Vec<BudgetItem>, ClinicError> {
        self.gate().await?;
        self.inner.list_budget_items(patient, filter).await
    }

    async fn budget_settings(&self, patient: PatientId) -> Result<Option<BudgetSettings>, ClinicError> {
        self.gate().await?;
        self.inner.budget_settings(patient).await
    }

    async fn list_sessions(&self, patient: PatientId, filter: &RecordFilter) -> Result<Vec<TherapySession>, ClinicError> {
        self.gate().await?;
        self.inner.list_sessions(patient, filter).await
    }

    async fn list_strategy_usage(&self, patient: PatientId, filter: &RecordFilter) -> Result<Vec<StrategyUsage>, ClinicError> {
        self.gate().await?;
        self.inner.list_strategy_usage(patient, filter).await
    }
}

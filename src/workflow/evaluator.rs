//! Phase completion criteria.
//!
//! Pure predicates over a snapshot of a phase's checklist state. The snapshot
//! is owned by whatever UI collects it; nothing here holds state.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::{WorkflowError, WorkflowResult};
use super::phase::PhaseKind;

/// A single checklist entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    /// Item id
    pub id: String,

    /// Item text
    pub text: String,

    /// Whether the item is ticked
    #[serde(default)]
    pub completed: bool,
}

impl ChecklistItem {
    /// Create an unticked item.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), completed: false }
    }

    /// Return the item with its completed flag set.
    pub fn with_completed(mut self, completed: bool) -> Self {
        self.completed = completed;
        self
    }
}

/// Ordered checklist owned by a phase's UI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompletionChecklist {
    items: Vec<ChecklistItem>,
}

impl CompletionChecklist {
    /// Create a checklist from items.
    pub fn new(items: Vec<ChecklistItem>) -> Self {
        Self { items }
    }

    /// Items in order.
    pub fn items(&self) -> &[ChecklistItem] {
        &self.items
    }

    /// Flip an item. Returns false if the id is unknown.
    pub fn toggle(&mut self, id: &str) -> bool {
        match self.items.iter_mut().find(|i| i.id == id) {
            Some(item) => {
                item.completed = !item.completed;
                true
            }
            None => false,
        }
    }

    /// Set an item's flag. Returns false if the id is unknown.
    pub fn set(&mut self, id: &str, completed: bool) -> bool {
        match self.items.iter_mut().find(|i| i.id == id) {
            Some(item) => {
                item.completed = completed;
                true
            }
            None => false,
        }
    }

    /// Check if every item is ticked.
    pub fn all_completed(&self) -> bool {
        self.items.iter().all(|i| i.completed)
    }

    /// Items still open.
    pub fn pending(&self) -> Vec<&ChecklistItem> {
        self.items.iter().filter(|i| !i.completed).collect()
    }
}

/// Review status of a design deliverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliverableStatus {
    Pending,
    #[serde(rename = "In Progress")]
    InProgress,
    #[serde(rename = "In Review")]
    InReview,
    Completed,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for DeliverableStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::InProgress => "In Progress",
            Self::InReview => "In Review",
            Self::Completed => "Completed",
            Self::Unknown => "Unknown",
        };
        f.write_str(s)
    }
}

/// A phase deliverable as returned by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deliverable {
    /// Deliverable id
    #[serde(default)]
    pub id: String,

    /// Deliverable name
    #[serde(alias = "title")]
    pub name: String,

    /// Review status
    pub status: DeliverableStatus,
}

impl Deliverable {
    /// Create a deliverable.
    pub fn new(id: impl Into<String>, name: impl Into<String>, status: DeliverableStatus) -> Self {
        Self { id: id.into(), name: name.into(), status }
    }
}

/// UI/UX phase snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiUxSnapshot {
    /// Design deliverables
    #[serde(default)]
    pub deliverables: Vec<Deliverable>,
}

/// Development phase snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevelopmentSnapshot {
    /// Tasks done
    #[serde(default)]
    pub tasks_completed: u32,

    /// Tasks planned
    #[serde(default)]
    pub total_tasks: u32,

    /// Development checklist
    #[serde(default)]
    pub checklist: CompletionChecklist,
}

/// Testing phase deliverables-readiness record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TestingReadiness {
    pub test_cases_executed: bool,
    pub results_documented: bool,
    pub bugs_logged: bool,
    pub fixes_retested: bool,
    pub performance_verified: bool,
    pub security_checks_passed: bool,
    pub cross_browser_tested: bool,
    pub final_report_prepared: bool,
}

impl TestingReadiness {
    /// A record with every flag set.
    pub fn all_ready() -> Self {
        Self {
            test_cases_executed: true,
            results_documented: true,
            bugs_logged: true,
            fixes_retested: true,
            performance_verified: true,
            security_checks_passed: true,
            cross_browser_tested: true,
            final_report_prepared: true,
        }
    }

    /// Flags with their display names.
    pub fn flags(&self) -> [(&'static str, bool); 8] {
        [
            ("Test cases executed", self.test_cases_executed),
            ("Test results documented", self.results_documented),
            ("Bugs logged", self.bugs_logged),
            ("Fixes retested", self.fixes_retested),
            ("Performance verified", self.performance_verified),
            ("Security checks passed", self.security_checks_passed),
            ("Cross-browser tested", self.cross_browser_tested),
            ("Final report prepared", self.final_report_prepared),
        ]
    }
}

/// Snapshot of one phase's completion state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseSnapshot {
    UiUx(UiUxSnapshot),
    Development(DevelopmentSnapshot),
    Testing(TestingReadiness),
}

impl PhaseSnapshot {
    /// Phase kind this snapshot belongs to.
    pub const fn kind(&self) -> PhaseKind {
        match self {
            Self::UiUx(_) => PhaseKind::UiUx,
            Self::Development(_) => PhaseKind::Development,
            Self::Testing(_) => PhaseKind::Testing,
        }
    }

    /// Parse an untyped snapshot for `phase_type`.
    pub fn from_json(phase_type: &str, state: &serde_json::Value) -> WorkflowResult<Self> {
        let kind: PhaseKind = phase_type.parse()?;
        let invalid = |e: serde_json::Error| WorkflowError::InvalidSnapshot(e.to_string());

        match kind {
            PhaseKind::UiUx => {
                serde_json::from_value(state.clone()).map(Self::UiUx).map_err(invalid)
            }
            PhaseKind::Development => {
                serde_json::from_value(state.clone()).map(Self::Development).map_err(invalid)
            }
            PhaseKind::Testing => {
                serde_json::from_value(state.clone()).map(Self::Testing).map_err(invalid)
            }
            PhaseKind::Completion => Err(WorkflowError::UnknownPhase(phase_type.to_string())),
        }
    }
}

/// Check whether a phase's completion criteria are met.
pub fn evaluate(snapshot: &PhaseSnapshot) -> bool {
    match snapshot {
        PhaseSnapshot::UiUx(s) => {
            s.deliverables.iter().all(|d| d.status == DeliverableStatus::Completed)
        }
        PhaseSnapshot::Development(s) => {
            s.tasks_completed >= s.total_tasks && s.checklist.all_completed()
        }
        PhaseSnapshot::Testing(r) => r.flags().iter().all(|(_, ready)| *ready),
    }
}

/// Evaluate an untyped snapshot.
///
/// Fails with `UnknownPhase` for phase types without criteria and with
/// `InvalidSnapshot` for malformed input.
pub fn evaluate_json(phase_type: &str, state: &serde_json::Value) -> WorkflowResult<bool> {
    PhaseSnapshot::from_json(phase_type, state).map(|s| evaluate(&s))
}

/// Fail-closed readiness check: any error means "not ready".
pub fn is_ready(phase_type: &str, state: &serde_json::Value) -> bool {
    match evaluate_json(phase_type, state) {
        Ok(ready) => ready,
        Err(e) => {
            tracing::error!(phase_type, code = e.code(), error = %e, "Phase evaluation failed");
            false
        }
    }
}

/// Human-readable list of what still blocks a phase.
pub fn unmet_criteria(snapshot: &PhaseSnapshot) -> Vec<String> {
    match snapshot {
        PhaseSnapshot::UiUx(s) => s
            .deliverables
            .iter()
            .filter(|d| d.status != DeliverableStatus::Completed)
            .map(|d| format!("Deliverable '{}' is {}", d.name, d.status))
            .collect(),
        PhaseSnapshot::Development(s) => {
            let mut unmet = Vec::new();
            if s.tasks_completed < s.total_tasks {
                unmet.push(format!(
                    "{} of {} tasks completed",
                    s.tasks_completed, s.total_tasks
                ));
            }
            unmet.extend(s.checklist.pending().iter().map(|i| format!("Checklist: {}", i.text)));
            unmet
        }
        PhaseSnapshot::Testing(r) => r
            .flags()
            .iter()
            .filter(|(_, ready)| !ready)
            .map(|(name, _)| format!("{} not confirmed", name))
            .collect(),
    }
}

//! Workflow state and transition requests.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::phase::PhaseId;

/// Completion flags keyed by phase id.
pub type CompletionMap = BTreeMap<PhaseId, bool>;

/// Per-project workflow position.
///
/// Completion is monotonic: transitions only ever go through `with_completed`,
/// which sets flags to `true`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    /// Project this state belongs to
    pub project_id: String,

    /// Currently active phase
    pub active_phase_id: PhaseId,

    /// Completion flags
    pub completed: CompletionMap,
}

impl WorkflowState {
    /// Create a new state.
    pub fn new(project_id: impl Into<String>, active_phase_id: PhaseId) -> Self {
        Self { project_id: project_id.into(), active_phase_id, completed: CompletionMap::new() }
    }

    /// Check if a phase is marked completed.
    pub fn is_completed(&self, id: &PhaseId) -> bool {
        self.completed.get(id).copied().unwrap_or(false)
    }

    /// Ids of all completed phases.
    pub fn completed_phases(&self) -> Vec<&PhaseId> {
        self.completed.iter().filter(|(_, done)| **done).map(|(id, _)| id).collect()
    }

    /// Return a copy with a different active phase.
    pub fn with_active(mut self, id: PhaseId) -> Self {
        self.active_phase_id = id;
        self
    }

    /// Return a copy with `id` marked completed.
    pub fn with_completed(mut self, id: PhaseId) -> Self {
        self.completed.insert(id, true);
        self
    }

    /// Return a copy with its completion flags replaced.
    pub fn with_completion_map(mut self, completed: CompletionMap) -> Self {
        self.completed = completed;
        self
    }
}

/// Direction of a requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionDirection {
    /// `advance` to the successor
    Forward,
    /// `retreat` to the predecessor
    Backward,
    /// `go_to` an arbitrary phase
    Jump,
}

impl fmt::Display for TransitionDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Forward => "forward",
            Self::Backward => "backward",
            Self::Jump => "jump",
        };
        f.write_str(s)
    }
}

/// Ephemeral record of one user-triggered transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRequest {
    /// Target project
    pub project_id: String,

    /// Phase active when the request was made
    pub from_phase: PhaseId,

    /// Phase to activate
    pub to_phase: PhaseId,

    /// Kind of transition
    pub direction: TransitionDirection,

    /// Request-sequence token; responses for older tokens are discarded
    pub sequence: u64,

    /// When the request was made
    pub requested_at: DateTime<Utc>,
}

impl TransitionRequest {
    /// Create a new request stamped with the current time.
    pub fn new(
        project_id: impl Into<String>,
        from_phase: PhaseId,
        to_phase: PhaseId,
        direction: TransitionDirection,
        sequence: u64,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            from_phase,
            to_phase,
            direction,
            sequence,
            requested_at: Utc::now(),
        }
    }
}

impl fmt::Display for TransitionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {} -> {} ({})",
            self.sequence, self.project_id, self.from_phase, self.to_phase, self.direction
        )
    }
}

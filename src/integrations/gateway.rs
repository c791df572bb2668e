//! Phase gateway: the network boundary for workflow persistence.
//!
//! Implementations translate coordinator intents into backend calls and map
//! every failure into the workflow error taxonomy: reads fail with
//! `WorkflowError::Load`, writes with `WorkflowError::Transition`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::workflow::{CompletionMap, Deliverable, PhaseId, WorkflowResult};

/// Workflow status as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowStatus {
    /// Active phase, if the backend remembers one
    pub active_phase_id: Option<PhaseId>,

    /// Completion flags
    pub completed: CompletionMap,
}

impl WorkflowStatus {
    /// Create a status.
    pub fn new(active_phase_id: Option<PhaseId>, completed: CompletionMap) -> Self {
        Self { active_phase_id, completed }
    }
}

/// Phase details as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseDetails {
    /// Display name
    #[serde(default, alias = "name")]
    pub label: Option<String>,

    /// Backend status string (e.g. "in_progress", "awaiting_approval")
    #[serde(default)]
    pub status: Option<String>,

    /// Start timestamp
    #[serde(default)]
    pub started_at: Option<String>,

    /// Completion timestamp
    #[serde(default)]
    pub completed_at: Option<String>,

    /// Any other fields the backend sends
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Network boundary for workflow state.
///
/// Every call is awaited by the caller; its result is the only basis for
/// changing local state. No call retries on its own.
#[async_trait]
pub trait PhaseGateway: Send + Sync {
    /// GET the workflow status.
    async fn fetch_status(&self, project_id: &str) -> WorkflowResult<WorkflowStatus>;

    /// PUT the active phase.
    async fn set_active_phase(&self, project_id: &str, phase: &PhaseId) -> WorkflowResult<()>;

    /// POST a phase completion.
    async fn mark_completed(&self, project_id: &str, phase: &PhaseId) -> WorkflowResult<()>;

    /// GET a phase's details.
    async fn phase_details(&self, project_id: &str, phase: &PhaseId)
        -> WorkflowResult<PhaseDetails>;

    /// GET a phase's deliverables.
    async fn phase_deliverables(
        &self,
        project_id: &str,
        phase: &PhaseId,
    ) -> WorkflowResult<Vec<Deliverable>>;

    /// POST an approval request for a phase.
    async fn request_approval(
        &self,
        project_id: &str,
        phase: &PhaseId,
        comment: Option<&str>,
    ) -> WorkflowResult<()>;

    /// POST a phase approval.
    async fn approve_phase(
        &self,
        project_id: &str,
        phase: &PhaseId,
        comment: Option<&str>,
    ) -> WorkflowResult<()>;

    /// POST a phase rejection.
    async fn reject_phase(
        &self,
        project_id: &str,
        phase: &PhaseId,
        reason: Option<&str>,
    ) -> WorkflowResult<()>;

    /// Gateway name for logging.
    fn name(&self) -> &str;
}

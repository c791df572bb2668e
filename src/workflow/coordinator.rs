//! Workflow coordinator.
//!
//! Owns the phase chain, the active phase and the completion flags for one
//! project, and is the only writer of that state. Every change is applied
//! after the gateway confirms it, never before.
//!
//! Transitions are single-flight: while one is awaiting the gateway, another
//! is rejected with `TransitionInFlight`. Each request takes a sequence token;
//! a response whose token is no longer the latest is discarded, and after
//! `detach` every response is ignored.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use crate::integrations::gateway::{PhaseDetails, PhaseGateway, WorkflowStatus};
use crate::integrations::notifications::{NotificationRelay, Outcome};

use super::error::{WorkflowError, WorkflowResult};
use super::evaluator::Deliverable;
use super::phase::{Phase, PhaseChain, PhaseId};
use super::state::{CompletionMap, TransitionDirection, TransitionRequest, WorkflowState};

/// Default banner text when the backend sends no message.
pub const DEFAULT_FALLBACK_MESSAGE: &str = "Something went wrong. Please try again.";

/// Coordinator behavior switches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorOptions {
    /// Banner text for failures without a backend message
    pub fallback_message: String,

    /// Show an error banner when navigation hits a locked phase
    pub announce_locked_phase: bool,
}

impl Default for CoordinatorOptions {
    fn default() -> Self {
        Self {
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
            announce_locked_phase: false,
        }
    }
}

/// Display row for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseView {
    /// The phase
    pub phase: Phase,

    /// Whether the phase may be entered
    pub accessible: bool,

    /// Whether the phase is completed
    pub completed: bool,

    /// Whether the phase is the active one
    pub active: bool,
}

/// Clears the in-flight flag when dropped, including on cancellation.
struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Phase-progression state machine for one project.
pub struct WorkflowCoordinator {
    project_id: String,
    chain: PhaseChain,
    gateway: Arc<dyn PhaseGateway>,
    relay: Arc<dyn NotificationRelay>,
    options: CoordinatorOptions,
    state: Mutex<Option<WorkflowState>>,
    sequence: AtomicU64,
    in_flight: AtomicBool,
    attached: AtomicBool,
}

impl WorkflowCoordinator {
    /// Create a coordinator. Call `initialize` before any transition.
    pub fn new(
        project_id: impl Into<String>,
        chain: PhaseChain,
        gateway: Arc<dyn PhaseGateway>,
        relay: Arc<dyn NotificationRelay>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            chain,
            gateway,
            relay,
            options: CoordinatorOptions::default(),
            state: Mutex::new(None),
            sequence: AtomicU64::new(0),
            in_flight: AtomicBool::new(false),
            attached: AtomicBool::new(true),
        }
    }

    /// Replace the behavior switches.
    pub fn with_options(mut self, options: CoordinatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Project this coordinator manages.
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// The phase chain.
    pub fn chain(&self) -> &PhaseChain {
        &self.chain
    }

    /// Snapshot of the current state, `None` before `initialize`.
    pub fn state(&self) -> Option<WorkflowState> {
        self.state.lock().clone()
    }

    /// Whether a transition is awaiting the gateway.
    pub fn in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Whether the active phase is the terminal one.
    pub fn is_finished(&self) -> bool {
        self.state
            .lock()
            .as_ref()
            .is_some_and(|s| s.active_phase_id == self.chain.terminal().id)
    }

    /// Stop applying responses. Requests already sent still complete on the
    /// backend, but their results are ignored.
    pub fn detach(&self) {
        self.attached.store(false, Ordering::SeqCst);
        tracing::debug!(project = %self.project_id, "Workflow view detached");
    }

    /// Wait for the relay to finish delivering outcomes.
    pub async fn flush_notifications(&self) {
        self.relay.flush().await;
    }

    /// Whether `id` may be entered under `completed`.
    pub fn can_access(&self, id: &PhaseId, completed: &CompletionMap) -> bool {
        self.chain.can_access(id, completed)
    }

    /// Phase rows for display, empty before `initialize`.
    pub fn accessible_phases(&self) -> Vec<PhaseView> {
        let guard = self.state.lock();
        let Some(state) = guard.as_ref() else {
            return Vec::new();
        };

        self.chain
            .phases()
            .iter()
            .map(|phase| PhaseView {
                phase: phase.clone(),
                accessible: self.chain.can_access(&phase.id, &state.completed),
                completed: state.is_completed(&phase.id),
                active: phase.id == state.active_phase_id,
            })
            .collect()
    }

    /// Load the workflow status and pick the active phase.
    pub async fn initialize(&self) -> WorkflowResult<WorkflowState> {
        self.initialize_at(None).await
    }

    /// Load the workflow status, preferring `requested` over the backend's
    /// active phase when it is accessible.
    ///
    /// An inaccessible or unknown phase redirects to the first incomplete one.
    /// On failure no state is produced and the previous state is kept.
    pub async fn initialize_at(
        &self,
        requested: Option<&PhaseId>,
    ) -> WorkflowResult<WorkflowState> {
        let seq = self.next_sequence();
        tracing::debug!(project = %self.project_id, seq, gateway = self.gateway.name(), "Fetching workflow status");

        let status = match self.gateway.fetch_status(&self.project_id).await {
            Ok(status) => status,
            Err(e) => {
                tracing::info!(project = %self.project_id, error = %e, "Workflow status unavailable");
                return Err(e);
            }
        };

        let state = self.reconcile(status, requested);
        self.apply(seq, state)
    }

    /// Re-fetch the status, staying on the current phase if still accessible.
    ///
    /// Completion flags already confirmed are kept even if the backend no
    /// longer reports them.
    pub async fn reload(&self) -> WorkflowResult<WorkflowState> {
        let current = self.state().map(|s| s.active_phase_id);
        self.initialize_at(current.as_ref()).await
    }

    /// Complete the active phase and move to its successor.
    ///
    /// The caller is trusted to have checked the phase's completion criteria.
    /// On the terminal phase this is a no-op. Persists in two steps
    /// (`mark_completed`, then `set_active_phase`); if either fails the local
    /// state is left exactly as it was.
    pub async fn advance(&self) -> WorkflowResult<WorkflowState> {
        let _guard = self.begin_transition()?;
        let current = self.current_state()?;
        let active = self.active_phase(&current)?.clone();

        let Some(next_id) = active.next_phase_id.clone() else {
            tracing::debug!(project = %self.project_id, phase = %active.id, "Advance on terminal phase ignored");
            return Ok(current);
        };

        let request = TransitionRequest::new(
            self.project_id.clone(),
            active.id.clone(),
            next_id.clone(),
            TransitionDirection::Forward,
            self.next_sequence(),
        );
        tracing::debug!(request = %request, "Requesting transition");

        if let Err(e) = self.gateway.mark_completed(&self.project_id, &active.id).await {
            return Err(self.fail(&request, e));
        }
        self.ensure_current(request.sequence)?;

        if let Err(e) = self.gateway.set_active_phase(&self.project_id, &next_id).await {
            return Err(self.fail(&request, e));
        }

        let next_state = current.with_completed(active.id.clone()).with_active(next_id.clone());
        let applied = self.apply(request.sequence, next_state)?;

        let next_label = self.label(&next_id);
        tracing::info!(request = %request, "Phase advanced");
        self.relay.notify(&Outcome::success(format!(
            "{} completed. Moved to {}.",
            active.label, next_label
        )));

        Ok(applied)
    }

    /// Move back to the predecessor without touching completion flags.
    ///
    /// On the first phase this is a no-op.
    pub async fn retreat(&self) -> WorkflowResult<WorkflowState> {
        let _guard = self.begin_transition()?;
        let current = self.current_state()?;

        let Some(previous) = self.chain.predecessor(&current.active_phase_id).cloned() else {
            tracing::debug!(project = %self.project_id, "Retreat on first phase ignored");
            return Ok(current);
        };

        let request = TransitionRequest::new(
            self.project_id.clone(),
            current.active_phase_id.clone(),
            previous.id.clone(),
            TransitionDirection::Backward,
            self.next_sequence(),
        );
        tracing::debug!(request = %request, "Requesting transition");

        if let Err(e) = self.gateway.set_active_phase(&self.project_id, &previous.id).await {
            return Err(self.fail(&request, e));
        }

        let applied = self.apply(request.sequence, current.with_active(previous.id.clone()))?;
        tracing::info!(request = %request, "Phase retreated");
        self.relay.notify(&Outcome::success(format!("Moved back to {}.", previous.label)));

        Ok(applied)
    }

    /// Jump to `target` if its predecessor is completed.
    ///
    /// Otherwise fails with `AccessDenied` and moves the active phase to the
    /// first incomplete one. The redirect needs no backend call: it is derived
    /// from completion flags the backend already confirmed.
    pub async fn go_to(&self, target: &PhaseId) -> WorkflowResult<WorkflowState> {
        let _guard = self.begin_transition()?;
        let current = self.current_state()?;

        if &current.active_phase_id == target {
            return Ok(current);
        }

        if !self.chain.can_access(target, &current.completed) {
            return Err(self.redirect(current, target));
        }

        let request = TransitionRequest::new(
            self.project_id.clone(),
            current.active_phase_id.clone(),
            target.clone(),
            TransitionDirection::Jump,
            self.next_sequence(),
        );
        tracing::debug!(request = %request, "Requesting transition");

        if let Err(e) = self.gateway.set_active_phase(&self.project_id, target).await {
            return Err(self.fail(&request, e));
        }

        let applied = self.apply(request.sequence, current.with_active(target.clone()))?;
        tracing::info!(request = %request, "Phase selected");
        self.relay.notify(&Outcome::success(format!("Switched to {}.", self.label(target))));

        Ok(applied)
    }

    /// Fetch a phase's details.
    pub async fn phase_details(&self, phase: &PhaseId) -> WorkflowResult<PhaseDetails> {
        self.require_phase(phase)?;
        self.gateway.phase_details(&self.project_id, phase).await
    }

    /// Fetch a phase's deliverables.
    pub async fn phase_deliverables(&self, phase: &PhaseId) -> WorkflowResult<Vec<Deliverable>> {
        self.require_phase(phase)?;
        self.gateway.phase_deliverables(&self.project_id, phase).await
    }

    /// Ask reviewers to approve a phase.
    pub async fn request_approval(
        &self,
        phase: &PhaseId,
        comment: Option<&str>,
    ) -> WorkflowResult<()> {
        let label = self.require_phase(phase)?.label.clone();
        let result = self.gateway.request_approval(&self.project_id, phase, comment).await;
        self.report(result, || format!("Approval requested for {}.", label))
    }

    /// Approve a phase.
    pub async fn approve_phase(&self, phase: &PhaseId, comment: Option<&str>) -> WorkflowResult<()> {
        let label = self.require_phase(phase)?.label.clone();
        let result = self.gateway.approve_phase(&self.project_id, phase, comment).await;
        self.report(result, || format!("{} approved.", label))
    }

    /// Reject a phase.
    pub async fn reject_phase(&self, phase: &PhaseId, reason: Option<&str>) -> WorkflowResult<()> {
        let label = self.require_phase(phase)?.label.clone();
        let result = self.gateway.reject_phase(&self.project_id, phase, reason).await;
        self.report(result, || format!("{} rejected.", label))
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn begin_transition(&self) -> WorkflowResult<FlightGuard<'_>> {
        self.in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| {
                tracing::debug!(project = %self.project_id, "Transition rejected, another is in flight");
                WorkflowError::TransitionInFlight(self.project_id.clone())
            })?;
        Ok(FlightGuard { flag: &self.in_flight })
    }

    fn current_state(&self) -> WorkflowResult<WorkflowState> {
        self.state().ok_or_else(|| WorkflowError::NotInitialized(self.project_id.clone()))
    }

    fn active_phase(&self, state: &WorkflowState) -> WorkflowResult<&Phase> {
        self.chain
            .get(&state.active_phase_id)
            .ok_or_else(|| WorkflowError::PhaseNotFound(state.active_phase_id.to_string()))
    }

    fn require_phase(&self, id: &PhaseId) -> WorkflowResult<&Phase> {
        self.chain.get(id).ok_or_else(|| WorkflowError::PhaseNotFound(id.to_string()))
    }

    fn label(&self, id: &PhaseId) -> String {
        self.chain.get(id).map_or_else(|| id.to_string(), |p| p.label.clone())
    }

    /// Check that a response may still be applied.
    fn ensure_current(&self, seq: u64) -> WorkflowResult<()> {
        if !self.attached.load(Ordering::SeqCst) {
            return Err(WorkflowError::Detached);
        }
        let latest = self.sequence.load(Ordering::SeqCst);
        if latest != seq {
            tracing::warn!(project = %self.project_id, received = seq, latest, "Discarding stale response");
            return Err(WorkflowError::StaleResponse { received: seq, latest });
        }
        Ok(())
    }

    fn apply(&self, seq: u64, next: WorkflowState) -> WorkflowResult<WorkflowState> {
        self.ensure_current(seq)?;
        *self.state.lock() = Some(next.clone());
        Ok(next)
    }

    /// Report a failed transition and hand back the error.
    fn fail(&self, request: &TransitionRequest, error: WorkflowError) -> WorkflowError {
        tracing::info!(request = %request, code = error.code(), error = %error, "Transition failed");
        if self.attached.load(Ordering::SeqCst) {
            self.relay.notify(&Outcome::error(error.user_message(&self.options.fallback_message)));
        }
        error
    }

    fn report(
        &self,
        result: WorkflowResult<()>,
        success: impl FnOnce() -> String,
    ) -> WorkflowResult<()> {
        if !self.attached.load(Ordering::SeqCst) {
            return result;
        }
        match &result {
            Ok(()) => self.relay.notify(&Outcome::success(success())),
            Err(e) => {
                tracing::info!(project = %self.project_id, code = e.code(), error = %e, "Approval request failed");
                self.relay.notify(&Outcome::error(e.user_message(&self.options.fallback_message)));
            }
        }
        result
    }

    fn redirect(&self, current: WorkflowState, requested: &PhaseId) -> WorkflowError {
        let target = self.chain.first_incomplete(&current.completed).clone();
        tracing::info!(
            project = %self.project_id,
            requested = %requested,
            redirected_to = %target.id,
            "Phase locked, redirecting"
        );

        if self.options.announce_locked_phase {
            let blocker = self
                .chain
                .predecessor(requested)
                .map_or_else(|| target.label.clone(), |p| p.label.clone());
            self.relay.notify(&Outcome::error(format!(
                "{} is locked. Complete {} first.",
                self.label(requested),
                blocker
            )));
        }

        *self.state.lock() = Some(current.with_active(target.id.clone()));
        WorkflowError::AccessDenied { requested: requested.clone(), redirected_to: target.id }
    }

    fn reconcile(&self, status: WorkflowStatus, requested: Option<&PhaseId>) -> WorkflowState {
        let mut completed = CompletionMap::new();
        for (id, done) in status.completed {
            if self.chain.contains(&id) {
                completed.insert(id, done);
            } else {
                tracing::warn!(project = %self.project_id, phase = %id, "Ignoring completion flag for unknown phase");
            }
        }

        // Completion never goes back to false. A backend that forgets a flag
        // this view already confirmed is logged and overruled.
        let previous = self.state.lock().as_ref().map(|s| s.completed.clone()).unwrap_or_default();
        for (id, done) in previous {
            if done && !completed.get(&id).copied().unwrap_or(false) {
                tracing::warn!(
                    project = %self.project_id,
                    phase = %id,
                    "Backend lost a confirmed completion, keeping it"
                );
                completed.insert(id, true);
            }
        }

        let candidate = requested.cloned().or(status.active_phase_id);
        let active = match candidate {
            Some(id) if self.chain.can_access(&id, &completed) => id,
            Some(id) => {
                let target = self.chain.first_incomplete(&completed).id.clone();
                tracing::info!(
                    project = %self.project_id,
                    requested = %id,
                    redirected_to = %target,
                    "Remembered phase not accessible, redirecting"
                );
                target
            }
            None => self.chain.first_incomplete(&completed).id.clone(),
        };

        WorkflowState::new(self.project_id.clone(), active).with_completion_map(completed)
    }
}

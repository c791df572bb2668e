//! Property-based tests for phase gating and transitions.

use std::sync::Arc;

use async_trait::async_trait;
use proptest::prelude::*;

use super::*;
use crate::integrations::gateway::{PhaseDetails, PhaseGateway, WorkflowStatus};
use crate::integrations::notifications::MemoryRelay;

// ===== STRATEGY HELPERS =====

/// Completion flags for the standard chain, any combination.
fn any_completion() -> impl Strategy<Value = CompletionMap> {
    prop::collection::vec(any::<bool>(), 4).prop_map(|flags| {
        PhaseChain::standard()
            .phases()
            .iter()
            .zip(flags)
            .map(|(phase, done)| (phase.id.clone(), done))
            .collect()
    })
}

#[derive(Debug, Clone)]
enum Op {
    Advance,
    Retreat,
    GoTo(usize),
    Reload,
}

fn any_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Advance),
        Just(Op::Retreat),
        (0usize..5).prop_map(Op::GoTo),
        Just(Op::Reload),
    ]
}

/// Gateway that accepts every write and always reports an empty status,
/// as a backend that has lost its records would.
struct AcceptingGateway;

#[async_trait]
impl PhaseGateway for AcceptingGateway {
    async fn fetch_status(&self, _project_id: &str) -> WorkflowResult<WorkflowStatus> {
        Ok(WorkflowStatus::default())
    }

    async fn set_active_phase(&self, _project_id: &str, _phase: &PhaseId) -> WorkflowResult<()> {
        Ok(())
    }

    async fn mark_completed(&self, _project_id: &str, _phase: &PhaseId) -> WorkflowResult<()> {
        Ok(())
    }

    async fn phase_details(&self, _project_id: &str, _phase: &PhaseId) -> WorkflowResult<PhaseDetails> {
        Ok(PhaseDetails::default())
    }

    async fn phase_deliverables(
        &self,
        _project_id: &str,
        _phase: &PhaseId,
    ) -> WorkflowResult<Vec<Deliverable>> {
        Ok(Vec::new())
    }

    async fn request_approval(
        &self,
        _project_id: &str,
        _phase: &PhaseId,
        _comment: Option<&str>,
    ) -> WorkflowResult<()> {
        Ok(())
    }

    async fn approve_phase(
        &self,
        _project_id: &str,
        _phase: &PhaseId,
        _comment: Option<&str>,
    ) -> WorkflowResult<()> {
        Ok(())
    }

    async fn reject_phase(
        &self,
        _project_id: &str,
        _phase: &PhaseId,
        _reason: Option<&str>,
    ) -> WorkflowResult<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "accepting"
    }
}

/// Run `ops` against a fresh coordinator, returning every state observed.
fn run_ops(ops: &[Op]) -> Vec<WorkflowState> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    runtime.block_on(async {
        let chain = PhaseChain::standard();
        let ids: Vec<PhaseId> = chain.phases().iter().map(|p| p.id.clone()).collect();
        let coordinator = WorkflowCoordinator::new(
            "prop",
            chain,
            Arc::new(AcceptingGateway),
            Arc::new(MemoryRelay::new()),
        );

        let mut states = vec![coordinator.initialize().await.unwrap()];
        for op in ops {
            let _ = match op {
                Op::Advance => coordinator.advance().await,
                Op::Retreat => coordinator.retreat().await,
                Op::GoTo(i) => {
                    let target = ids.get(*i).cloned().unwrap_or_else(|| PhaseId::from("unknown"));
                    coordinator.go_to(&target).await
                }
                Op::Reload => coordinator.reload().await,
            };
            states.push(coordinator.state().unwrap());
        }
        states
    })
}

// ===== GATING =====

proptest! {
    /// Property: a phase is accessible iff it is first or its predecessor is completed
    #[test]
    fn test_linear_gating(completed in any_completion()) {
        let chain = PhaseChain::standard();
        for (i, phase) in chain.phases().iter().enumerate() {
            let expected = i == 0 || completed[&chain.phases()[i - 1].id];
            prop_assert_eq!(chain.can_access(&phase.id, &completed), expected);
        }
    }

    /// Property: the redirect target is always accessible
    #[test]
    fn test_redirect_target_accessible(completed in any_completion()) {
        let chain = PhaseChain::standard();
        let target = chain.first_incomplete(&completed);
        prop_assert!(chain.can_access(&target.id, &completed));
    }

    /// Property: the redirect target is the first phase not completed, else the terminal one
    #[test]
    fn test_redirect_target_is_first_incomplete(completed in any_completion()) {
        let chain = PhaseChain::standard();
        let expected = chain
            .phases()
            .iter()
            .find(|p| !completed[&p.id])
            .unwrap_or_else(|| chain.terminal());
        prop_assert_eq!(&chain.first_incomplete(&completed).id, &expected.id);
    }
}

// ===== TRANSITIONS =====

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: completion flags never go from true to false
    #[test]
    fn test_completion_is_monotonic(ops in prop::collection::vec(any_op(), 0..20)) {
        let states = run_ops(&ops);
        for pair in states.windows(2) {
            for id in pair[0].completed_phases() {
                prop_assert!(pair[1].is_completed(id), "{} lost completion", id);
            }
        }
    }

    /// Property: the active phase is always accessible
    #[test]
    fn test_active_phase_always_accessible(ops in prop::collection::vec(any_op(), 0..20)) {
        let chain = PhaseChain::standard();
        for state in run_ops(&ops) {
            prop_assert!(chain.can_access(&state.active_phase_id, &state.completed));
        }
    }

    /// Property: the terminal phase is never marked completed
    #[test]
    fn test_terminal_never_completed(ops in prop::collection::vec(any_op(), 0..20)) {
        let terminal = PhaseChain::standard().terminal().id.clone();
        for state in run_ops(&ops) {
            prop_assert!(!state.is_completed(&terminal));
        }
    }
}

// ===== EVALUATION =====

proptest! {
    /// Property: development is complete iff all tasks and checklist items are done
    #[test]
    fn test_development_criteria(
        done in 0u32..10,
        total in 0u32..10,
        checks in prop::collection::vec(any::<bool>(), 0..6),
    ) {
        let checklist = CompletionChecklist::new(
            checks
                .iter()
                .enumerate()
                .map(|(i, c)| ChecklistItem::new(format!("c{i}"), format!("Item {i}")).with_completed(*c))
                .collect(),
        );
        let snapshot = PhaseSnapshot::Development(DevelopmentSnapshot {
            tasks_completed: done,
            total_tasks: total,
            checklist,
        });
        let expected = done >= total && checks.iter().all(|c| *c);
        prop_assert_eq!(evaluate(&snapshot), expected);
        prop_assert_eq!(unmet_criteria(&snapshot).is_empty(), expected);
    }
}
